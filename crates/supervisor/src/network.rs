//! Per-VM tap name and `/30` IPv4 subnet derivation, ported from the
//! original's `IPv4NetworkWithInterfaces` helper
//! (`vm_supervisor/network/ipaddresses.py`) using plain [`Ipv4Addr`]
//! arithmetic instead of a new crate.

use std::net::Ipv4Addr;

/// Base of the private range carved into one `/30` per VM id: `.0` network,
/// `.1` host-side tap address, `.2` guest address, `.3` broadcast.
const BASE_NETWORK: u32 = 0xAC10_0000; // 172.16.0.0

pub struct VmSubnet {
    pub tap_name: String,
    pub host_address: Ipv4Addr,
    pub guest_address: Ipv4Addr,
    pub prefix_len: u8,
}

pub fn subnet_for_id(id: u64) -> VmSubnet {
    let network_base = BASE_NETWORK.wrapping_add((id as u32).wrapping_mul(4));
    VmSubnet {
        tap_name: format!("vmtap{id}"),
        host_address: Ipv4Addr::from(network_base + 1),
        guest_address: Ipv4Addr::from(network_base + 2),
        prefix_len: 30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnets_for_distinct_ids_do_not_overlap() {
        let a = subnet_for_id(1);
        let b = subnet_for_id(2);
        assert_ne!(a.host_address, b.host_address);
        assert_ne!(a.guest_address, b.guest_address);
        assert_ne!(a.tap_name, b.tap_name);
    }

    #[test]
    fn subnet_host_and_guest_addresses_differ() {
        let subnet = subnet_for_id(7);
        assert_ne!(subnet.host_address, subnet.guest_address);
    }
}
