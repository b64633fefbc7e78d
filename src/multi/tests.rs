use quickcheck_macros::quickcheck;
use std::prelude::v1::*;

use super::*;
use crate::tests::ShadowAllocator;

macro_rules! gen_test {
    ($mod:ident, $mem:literal, $fl:literal, $sl:literal, $region_size:expr) => {
        mod $mod {
            use super::*;
            type TheTlsf = MultiTlsf<$mem, $fl, $sl>;
            const REGION_SIZE: usize = $region_size;

            #[test]
            fn minimal() {
                let _ = env_logger::builder().is_test(true).try_init();

                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::ReturnError).unwrap();
                log::trace!("tlsf = {:?}", tlsf);

                let before = tlsf.remaining_capacity();
                let ptr = tlsf.acquire(1).unwrap();
                log::trace!("ptr = {:?}", ptr);
                assert_eq!(tlsf.locate(ptr), Some(0));
                unsafe { tlsf.release(ptr) };
                assert_eq!(tlsf.remaining_capacity(), before);
                assert_eq!(tlsf.region_count(), 1);
            }

            #[test]
            fn grows() {
                let _ = env_logger::builder().is_test(true).try_init();

                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::ReturnError).unwrap();
                let capacity = tlsf.regions()[0].tlsf().capacity();
                let size = REGION_SIZE / 3;

                let mut ptrs = Vec::new();
                let mut total = 0;
                while total <= capacity * 2 {
                    let ptr = tlsf.acquire(size).unwrap();
                    total += size;
                    ptrs.push(ptr);
                }
                assert!(tlsf.region_count() >= 2);
                tlsf.check();

                // Every pointer is found in the region it came from
                for &ptr in &ptrs {
                    let i = tlsf.locate(ptr).unwrap();
                    let range = tlsf.regions()[i].tlsf().address_range();
                    assert!(range.contains(&(ptr.as_ptr() as usize)));
                }

                let region_count = tlsf.region_count();
                for ptr in ptrs {
                    unsafe { tlsf.release(ptr) };
                }
                tlsf.check();

                // Emptied regions are kept
                assert_eq!(tlsf.region_count(), region_count);
                let full: usize = tlsf.regions().iter().map(|r| r.tlsf().capacity()).sum();
                assert_eq!(tlsf.remaining_capacity(), full);
            }

            #[test]
            fn oversized() {
                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::ReturnError).unwrap();
                let error = tlsf.acquire(REGION_SIZE).unwrap_err();
                assert_eq!(error.requested, REGION_SIZE);
                assert_eq!(tlsf.region_count(), 1);
            }

            #[test]
            #[should_panic(expected = "out of memory")]
            fn oversized_panic() {
                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::Panic).unwrap();
                let _ = tlsf.acquire(REGION_SIZE);
            }

            #[test]
            fn failed_requests_add_no_region() {
                let _ = env_logger::builder().is_test(true).try_init();

                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::ReturnError).unwrap();
                let capacity = tlsf.regions()[0].tlsf().capacity();

                // Sizes near the capacity of an empty region. Some of them
                // share the bucket of its free block and can't be served.
                for delta in 0..256 {
                    let size = capacity - delta.min(capacity);
                    for _ in 0..4 {
                        match tlsf.acquire(size) {
                            Ok(ptr) => unsafe { tlsf.release(ptr) },
                            Err(error) => assert_eq!(error.requested, size),
                        }
                        assert_eq!(tlsf.region_count(), 1, "size = {}", size);
                    }
                }
                tlsf.check();
            }

            #[test]
            fn resize_across_regions() {
                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::ReturnError).unwrap();
                let small = REGION_SIZE / 16;
                let big = REGION_SIZE / 2;

                // Fill the first region so that `ptr` can't grow in it
                let ptr = tlsf.acquire(small).unwrap();
                let mut fillers = Vec::new();
                while tlsf.region_count() == 1 {
                    fillers.push(tlsf.acquire(small).unwrap());
                }
                assert_eq!(tlsf.locate(ptr), Some(0));

                unsafe {
                    for i in 0..small {
                        *ptr.as_ptr().add(i) = i as u8;
                    }

                    let new_ptr = tlsf.resize(ptr, big).unwrap();
                    assert_ne!(tlsf.locate(new_ptr), Some(0));
                    assert!(tlsf.segment_size(new_ptr) >= big);
                    for i in 0..small {
                        assert_eq!(*new_ptr.as_ptr().add(i), i as u8);
                    }
                    tlsf.check();

                    tlsf.release(new_ptr);
                    for ptr in fillers {
                        tlsf.release(ptr);
                    }
                }
                tlsf.check();
            }

            #[test]
            #[should_panic(expected = "does not belong")]
            fn foreign_pointer() {
                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::ReturnError).unwrap();
                let mut other = 0u8;
                unsafe { tlsf.release(NonNull::from(&mut other)) };
            }

            #[quickcheck]
            fn random(bytecode: Vec<u8>) {
                random_inner(bytecode);
            }

            fn random_inner(bytecode: Vec<u8>) -> Option<()> {
                let _ = env_logger::builder().is_test(true).try_init();

                let mut tlsf = TheTlsf::new(REGION_SIZE, OomPolicy::ReturnError).unwrap();
                let mut sa = ShadowAllocator::new(tlsf.min_block_size());
                let mut known_regions = 0;

                #[derive(Debug)]
                struct Alloc {
                    ptr: NonNull<u8>,
                    len: usize,
                }
                let mut allocs: Vec<Alloc> = Vec::new();

                let mut it = bytecode.iter().cloned();
                loop {
                    // Let the shadow allocator know about new regions
                    for region in &tlsf.regions()[known_regions..] {
                        sa.insert_free_block(region.tlsf().address_range());
                    }
                    known_regions = tlsf.region_count();

                    match it.next()? % 8 {
                        0..=2 => {
                            let len = u32::from_le_bytes([it.next()?, it.next()?, it.next()?, 0]);
                            let len = ((len as u64 * REGION_SIZE as u64) >> 24) as usize;
                            log::trace!("alloc {}", len);

                            if let Ok(ptr) = tlsf.acquire(len) {
                                log::trace!(" → {:?}", ptr);
                                for region in &tlsf.regions()[known_regions..] {
                                    sa.insert_free_block(region.tlsf().address_range());
                                }
                                known_regions = tlsf.region_count();

                                let len = unsafe { tlsf.segment_size(ptr) };
                                sa.allocate(ptr.as_ptr() as usize, len);
                                allocs.push(Alloc { ptr, len });
                            }
                        }
                        3..=5 => {
                            let alloc_i = it.next()?;
                            if !allocs.is_empty() {
                                let alloc = allocs.swap_remove(alloc_i as usize % allocs.len());
                                log::trace!("dealloc {:?}", alloc);

                                sa.deallocate(alloc.ptr.as_ptr() as usize, alloc.len);
                                unsafe { tlsf.release(alloc.ptr) };
                            }
                        }
                        6..=7 => {
                            let alloc_i = it.next()?;
                            if !allocs.is_empty() {
                                let len = u32::from_le_bytes([it.next()?, it.next()?, it.next()?, 0]);
                                let len = ((len as u64 * REGION_SIZE as u64) >> 24) as usize;

                                let alloc_i = alloc_i as usize % allocs.len();
                                let alloc = &mut allocs[alloc_i];
                                log::trace!("realloc {:?} to {}", alloc, len);

                                if let Ok(ptr) = unsafe { tlsf.resize(alloc.ptr, len) } {
                                    log::trace!(" {:?} → {:?}", alloc.ptr, ptr);
                                    for region in &tlsf.regions()[known_regions..] {
                                        sa.insert_free_block(region.tlsf().address_range());
                                    }
                                    known_regions = tlsf.region_count();

                                    sa.deallocate(alloc.ptr.as_ptr() as usize, alloc.len);
                                    alloc.ptr = ptr;
                                    alloc.len = unsafe { tlsf.segment_size(ptr) };
                                    sa.allocate(alloc.ptr.as_ptr() as usize, alloc.len);
                                } else {
                                    log::trace!(" {:?} → fail", alloc.ptr);
                                }
                            }
                        }
                        _ => unreachable!(),
                    }
                    tlsf.check();
                }
            }
        }
    };
}

gen_test!(multi_12_3_2, 12, 3, 2, 4000);
gen_test!(multi_16_3_4, 16, 3, 4, 65535);
gen_test!(multi_20_4_4, 20, 4, 4, 1 << 16);

#[test]
fn region_too_small() {
    assert!(matches!(
        MultiTlsf::<12, 3, 2>::new(8, OomPolicy::ReturnError),
        Err(ConfigError::RegionTooSmall { .. })
    ));
}

#[test]
fn region_size_is_clamped() {
    let tlsf = MultiTlsf::<12, 3, 2>::new(1 << 20, OomPolicy::ReturnError).unwrap();
    assert_eq!(tlsf.region_size(), 4095);
}

#[test]
fn unservable_request_keeps_region_count() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut tlsf = MultiTlsf::<16, 3, 4>::new(4096, OomPolicy::ReturnError).unwrap();
    let capacity = tlsf.regions()[0].tlsf().capacity();
    let size = capacity - 50;

    // Occupy the first region so that every attempt reaches a fresh region
    let ptr = tlsf.acquire(100).unwrap();
    for _ in 0..10 {
        assert_eq!(tlsf.acquire(size).unwrap_err().requested, size);
    }
    assert_eq!(tlsf.region_count(), 1);

    // A servable request still grows the allocator
    let other = tlsf.acquire(capacity / 2).unwrap();
    assert_eq!(tlsf.region_count(), 1);
    let third = tlsf.acquire(capacity / 2).unwrap();
    assert_eq!(tlsf.region_count(), 2);
    unsafe {
        tlsf.release(ptr);
        tlsf.release(other);
        tlsf.release(third);
    }
    tlsf.check();
}
