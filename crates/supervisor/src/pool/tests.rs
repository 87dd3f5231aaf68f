use super::*;
use crate::vm::{Error as VmError, VmLifecycle};
use async_trait::async_trait;
use shared::dto::{
    Encoding, Environment, HardwareResources, Interface, InvocationReply, ResponseBody,
    ResponseEnvelope, ResponseHeaders, Scope,
};
use std::sync::atomic::AtomicU64;
use std::time::Duration;

struct FakeVm {
    hash: VmHash,
    setup_calls: AtomicU64,
    teardown_calls: AtomicU64,
    fail_setup: bool,
    fail_configure: bool,
}

impl FakeVm {
    fn new(hash: VmHash) -> Self {
        Self {
            hash,
            setup_calls: AtomicU64::new(0),
            teardown_calls: AtomicU64::new(0),
            fail_setup: false,
            fail_configure: false,
        }
    }

    fn failing_setup(hash: VmHash) -> Self {
        Self {
            fail_setup: true,
            ..Self::new(hash)
        }
    }

    fn failing_configure(hash: VmHash) -> Self {
        Self {
            fail_configure: true,
            ..Self::new(hash)
        }
    }
}

#[async_trait]
impl VmLifecycle for FakeVm {
    fn vm_hash(&self) -> &VmHash {
        &self.hash
    }

    async fn setup(&self) -> Result<(), VmError> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup {
            return Err(VmError::StartupFailed("injected setup failure".into()));
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), VmError> {
        Ok(())
    }

    async fn configure(&self, _program: &ProgramContent) -> Result<(), VmError> {
        if self.fail_configure {
            return Err(VmError::StartupFailed("injected configure failure".into()));
        }
        Ok(())
    }

    async fn start_guest_api(&self) -> Result<(), VmError> {
        Ok(())
    }

    async fn invoke(&self, _scope: Scope) -> Result<InvocationReply, VmError> {
        Ok(InvocationReply::Ok(ResponseEnvelope {
            headers: ResponseHeaders {
                status: 200,
                headers: vec![],
            },
            body: ResponseBody { body: vec![] },
            output: String::new(),
            output_data: None,
        }))
    }

    async fn teardown(&self) -> Result<(), VmError> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn program() -> ProgramContent {
    ProgramContent {
        code: vec![],
        encoding: Encoding::Plain,
        entrypoint: String::new(),
        interface: Interface::Executable,
        resources: HardwareResources {
            vcpus: 1,
            memory_mib: 128,
            seconds: 10,
        },
        environment: Environment { internet: false },
        volumes: vec![],
        input_data: vec![],
    }
}

fn hash(byte: u8) -> VmHash {
    let hex_digit = |b: u8| -> char {
        match b {
            0..=9 => (b'0' + b) as char,
            _ => (b'a' + (b - 10)) as char,
        }
    };
    let nibble_hi = hex_digit(byte >> 4);
    let nibble_lo = hex_digit(byte & 0x0f);
    let pair: String = [nibble_hi, nibble_lo].iter().collect();
    VmHash::parse(pair.repeat(32)).unwrap()
}

fn pool_of_fakes() -> Arc<VmPool<FakeVm>> {
    Arc::new(VmPool::new(0, |_id: u64, vm_hash: VmHash, _net: bool| {
        FakeVm::new(vm_hash)
    }))
}

#[tokio::test]
async fn cold_start_then_warm_reuse() {
    let pool = pool_of_fakes();
    let hash = hash(1);
    let program = program();

    let vm1 = pool.get_or_create(&program, &hash).await.unwrap();
    assert_eq!(pool.len().await, 0, "get_or_create alone does not cache");

    let vm2 = pool.get_or_create(&program, &hash).await.unwrap();
    assert!(
        !Arc::ptr_eq(&vm1, &vm2),
        "without caching, a second get_or_create must build a fresh vm"
    );

    pool.keep_running(vm1.clone(), program.clone(), Duration::from_secs(30))
        .await;
    assert_eq!(pool.len().await, 1);

    let vm3 = pool.get_or_create(&program, &hash).await.unwrap();
    assert!(Arc::ptr_eq(&vm1, &vm3), "warm reuse must return the same handle");
    assert_eq!(pool.counter_value(), 2, "second get_or_create before caching built a fresh vm");
}

#[tokio::test(start_paused = true)]
async fn timeout_eviction() {
    let pool = pool_of_fakes();
    let hash = hash(2);
    let program = program();

    let vm = pool.get_or_create(&program, &hash).await.unwrap();
    pool.keep_running(vm.clone(), program, Duration::from_millis(100))
        .await;
    assert_eq!(pool.len().await, 1);

    tokio::time::advance(Duration::from_millis(250)).await;
    tokio::task::yield_now().await;

    assert_eq!(pool.len().await, 0, "vm must be evicted after its timeout elapses");
    assert_eq!(vm.teardown_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn extend_races_eviction() {
    let pool = pool_of_fakes();
    let hash = hash(3);
    let program = program();

    let vm = pool.get_or_create(&program, &hash).await.unwrap();
    pool.keep_running(vm.clone(), program, Duration::from_millis(150))
        .await;

    tokio::time::advance(Duration::from_millis(50)).await;
    tokio::task::yield_now().await;
    pool.extend(&hash, Duration::from_millis(150)).await;

    // Original eviction would have fired at 150ms; the extend at 50ms should
    // have pushed the real expiry out to 200ms.
    tokio::time::advance(Duration::from_millis(120)).await;
    tokio::task::yield_now().await;
    assert_eq!(
        pool.len().await,
        1,
        "extend must push the eviction deadline out, not leave the old timer live"
    );

    tokio::time::advance(Duration::from_millis(150)).await;
    tokio::task::yield_now().await;
    assert_eq!(pool.len().await, 0, "extended timer must still fire eventually");
    assert_eq!(vm.teardown_calls.load(Ordering::SeqCst), 1, "must tear down exactly once");
}

#[tokio::test]
async fn counter_is_strictly_increasing() {
    let pool = pool_of_fakes();
    let program = program();

    let _ = pool.get_or_create(&program, &hash(10)).await.unwrap();
    let first = pool.counter_value();
    let _ = pool.get_or_create(&program, &hash(11)).await.unwrap();
    let second = pool.counter_value();

    assert!(second > first, "counter must never repeat an id");
}

#[tokio::test]
async fn failed_setup_never_caches() {
    let pool: Arc<VmPool<FakeVm>> = Arc::new(VmPool::new(0, |_id: u64, vm_hash: VmHash, _net: bool| {
        FakeVm::failing_setup(vm_hash)
    }));
    let program = program();
    let hash = hash(20);

    let err = pool.get_or_create(&program, &hash).await;
    assert!(err.is_err());
    assert_eq!(pool.len().await, 0);
    assert!(pool.get(&hash).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn eviction_waits_for_an_in_flight_invoke() {
    let pool = pool_of_fakes();
    let hash = hash(30);
    let program = program();

    let vm = pool.get_or_create(&program, &hash).await.unwrap();
    pool.keep_running(vm.clone(), program, Duration::from_millis(50))
        .await;

    // Hold the entry busy past its eviction deadline, then release it.
    pool.adjust_inflight(&hash, &vm, 1).await;
    tokio::time::advance(Duration::from_millis(100)).await;
    tokio::task::yield_now().await;
    assert_eq!(
        pool.len().await,
        1,
        "expire must not tear down a vm with an invocation in flight"
    );
    assert_eq!(vm.teardown_calls.load(Ordering::SeqCst), 0);

    pool.adjust_inflight(&hash, &vm, -1).await;
    tokio::time::advance(INFLIGHT_RECHECK_DELAY * 2).await;
    tokio::task::yield_now().await;
    assert_eq!(pool.len().await, 0, "expire must retry and evict once inflight drops to 0");
    assert_eq!(vm.teardown_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_configure_never_caches() {
    let pool: Arc<VmPool<FakeVm>> = Arc::new(VmPool::new(0, |_id: u64, vm_hash: VmHash, _net: bool| {
        FakeVm::failing_configure(vm_hash)
    }));
    let program = program();
    let hash = hash(21);

    let err = pool.get_or_create(&program, &hash).await;
    assert!(err.is_err());
    assert_eq!(pool.len().await, 0);
}
