#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod api;
mod bucket;
pub mod discipline;
pub mod hash;
pub mod map;
pub mod reflect;

pub use discipline::Algorithm;
pub use discipline::StrRef;
pub use map::ByteMap;
pub use map::MapIter;
pub use reflect::Dyn;
pub use reflect::Kind;
