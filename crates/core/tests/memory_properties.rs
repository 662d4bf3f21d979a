//! Property-based checks for the paged memory model (spec.md §8: "Memory").

use proptest::prelude::*;

use msim_core::common::Addr;
use msim_core::memory::PagedMemory;

fn small_memory() -> PagedMemory {
    PagedMemory::new(24, 6, 8).unwrap()
}

proptest! {
    #[test]
    fn write_then_read_round_trips_every_width(addr in 0u32..(1 << 15), value in any::<u64>()) {
        let mut mem = small_memory();
        let addr = Addr::new(u128::from(addr));

        mem.write_word::<1>(u128::from(value), addr);
        prop_assert_eq!(mem.read_word::<1>(addr), u128::from(value) & 0xFF);

        mem.write_word::<2>(u128::from(value), addr);
        prop_assert_eq!(mem.read_word::<2>(addr), u128::from(value) & 0xFFFF);

        mem.write_word::<4>(u128::from(value), addr);
        prop_assert_eq!(mem.read_word::<4>(addr), u128::from(value) & 0xFFFF_FFFF);

        mem.write_word::<8>(u128::from(value), addr);
        prop_assert_eq!(mem.read_word::<8>(addr), u128::from(value));
    }

    #[test]
    fn never_written_addresses_read_as_zero(addr in 0u32..(1 << 15)) {
        let mem = small_memory();
        prop_assert_eq!(mem.read_word::<4>(Addr::new(u128::from(addr))), 0);
    }

    #[test]
    fn guest_to_host_then_host_to_guest_is_identity(
        addr in 0u32..(1 << 14),
        bytes in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let mut mem = small_memory();
        let addr = Addr::new(u128::from(addr));
        mem.memcpy_host_to_guest(addr, &bytes).unwrap();

        let mut round_tripped = vec![0u8; bytes.len()];
        mem.memcpy_guest_to_host(&mut round_tripped, addr);
        prop_assert_eq!(round_tripped, bytes);
    }
}
