//! This crate implements the TLSF (Two-Level Segregated Fit) dynamic memory
//! allocation algorithm¹ over byte regions.
//!
//!  - **Allocation, deallocation, and reallocation complete in constant
//!    time.** No operation scans memory or free lists.
//!
//!  - **Every block carries boundary tags.** Adjacent free blocks are merged
//!    immediately, in both directions.
//!
//!  - **Memory is addressed by offsets.** An engine manages a [`Region`] and
//!    hands out [`Segment`]s, so the core is free of pointer arithmetic. A
//!    pointer-based [`Allocator`] interface is provided on top of it.
//!
//!  - **This crate supports `#![no_std]`.** It only needs `alloc`.
//!
//! <sub>¹ M. Masmano, I. Ripoll, A. Crespo and J. Real, "TLSF: a new dynamic
//! memory allocator for real-time systems," *Proceedings. 16th Euromicro
//! Conference on Real-Time Systems*, 2004. ECRTS 2004., Catania, Italy, 2004,
//! pp. 79-88, doi: 10.1109/EMRTS.2004.1311009.</sub>
//!
//! # Examples
//!
//! ## `Tlsf`: Core API
//!
//! ```rust
//! use tlsf_region::{OomPolicy, Tlsf};
//!
//! let mut pool = vec![0u8; 1 << 15];
//!
//! // A region must be shorter than `1 << MEM_BITS` bytes. There are
//! // `1 << FL_BITS` first level lists, each divided into `1 << SL_BITS`
//! // second level lists.
//! let mut tlsf: Tlsf<'_, 16, 3, 4> =
//!     Tlsf::from_slice(&mut pool, OomPolicy::ReturnError).unwrap();
//! //                 ^^  ^^ ^  ^
//! //                  |   | |  SL_BITS
//! //               'pool  | FL_BITS
//! //                     MEM_BITS
//!
//! let seg1 = tlsf.allocate(8).unwrap();
//! let seg2 = tlsf.allocate(8).unwrap();
//! tlsf.payload_mut(&seg1)[..8].copy_from_slice(&42u64.to_le_bytes());
//! tlsf.payload_mut(&seg2)[..8].copy_from_slice(&56u64.to_le_bytes());
//! assert_eq!(tlsf.payload(&seg1)[..8], 42u64.to_le_bytes());
//! assert_eq!(tlsf.payload(&seg2)[..8], 56u64.to_le_bytes());
//! tlsf.deallocate(seg1);
//! tlsf.deallocate(seg2);
//! assert_eq!(tlsf.remaining(), tlsf.capacity());
//! ```
//!
//! ## `MultiTlsf`: Growable Allocator
//!
//! ```rust
//! use tlsf_region::{Allocator, MultiTlsf, OomPolicy};
//!
//! let mut alloc = MultiTlsf::<20, 4, 4>::new(1 << 16, OomPolicy::Panic).unwrap();
//! let ptr = alloc.acquire(100).unwrap();
//! unsafe {
//!     let ptr = alloc.resize(ptr, 50_000).unwrap();
//!     alloc.release(ptr);
//! }
//! ```
//!
//! # Cargo Features
//!
//!  - `std`: Implements `std::error::Error` for the error types.
//!  - `poison`: Fills allocated and released payloads with poison patterns
//!    even if `debug_assertions` is disabled.
#![no_std]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

mod allocator;
mod block;
mod error;
mod fixed;
mod free_list;
pub mod int;
mod multi;
mod region;
mod tlsf;
pub use self::{
    allocator::Allocator,
    error::{AllocError, ConfigError, OomPolicy},
    fixed::FixedTlsf,
    multi::MultiTlsf,
    region::Region,
    tlsf::{Segment, Tlsf},
};

#[cfg(unix)]
mod native;
#[cfg(unix)]
pub use self::native::NativeAlloc;

#[cfg(test)]
mod tests;
