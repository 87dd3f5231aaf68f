//! Minimal content-addressed program store. Spec.md leaves program
//! ingestion out of scope; this resolves that gap with the simplest thing
//! consistent with `VmHash` already being a content hash: one MessagePack
//! file per hash on local disk.

use crate::http::ProgramLookup;
use async_trait::async_trait;
use shared::dto::{ProgramContent, VmHash};
use std::path::PathBuf;

pub struct FilesystemProgramStore {
    dir: PathBuf,
}

impl FilesystemProgramStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, vm_hash: &VmHash) -> PathBuf {
        self.dir.join(format!("{vm_hash}.mpk"))
    }

    pub async fn put(&self, vm_hash: &VmHash, program: &ProgramContent) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = shared::framing::encode_msgpack(program)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        tokio::fs::write(self.path_for(vm_hash), bytes).await
    }
}

#[async_trait]
impl ProgramLookup for FilesystemProgramStore {
    async fn lookup(&self, vm_hash: &VmHash) -> Option<ProgramContent> {
        let bytes = tokio::fs::read(self.path_for(vm_hash)).await.ok()?;
        shared::framing::decode_msgpack(&bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::dto::{Encoding, Environment, HardwareResources, Interface};

    fn sample_hash() -> VmHash {
        VmHash::parse("11".repeat(32)).unwrap()
    }

    fn sample_program() -> ProgramContent {
        ProgramContent {
            code: vec![1, 2, 3],
            encoding: Encoding::Plain,
            entrypoint: "main:app".to_string(),
            interface: Interface::Asgi,
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

    #[tokio::test]
    async fn put_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemProgramStore::new(dir.path().to_path_buf());
        let hash = sample_hash();
        let program = sample_program();

        store.put(&hash, &program).await.unwrap();
        let loaded = store.lookup(&hash).await.unwrap();
        assert_eq!(loaded.entrypoint, program.entrypoint);
        assert_eq!(loaded.code, program.code);
    }

    #[tokio::test]
    async fn lookup_missing_hash_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemProgramStore::new(dir.path().to_path_buf());
        assert!(store.lookup(&sample_hash()).await.is_none());
    }
}
