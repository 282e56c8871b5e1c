//! The runtime's boxed dynamic value and its structural hash.
//!
//! [`Dyn`] is the representation the surrounding runtime uses for a value
//! whose type is only known at run time. The map's dynamic key discipline
//! stores pointers to these and needs two things from them: an equality that
//! matches the language's `==` on dynamic values (dynamic-type identity
//! first, then structural comparison), and a hash that is consistent with
//! that equality. The hash is defined recursively on the value's kind and
//! combines aggregate members with XOR, which is insensitive to exactly the
//! distinctions the equality also ignores.
//!
//! Struct values carry every field, whether or not the source language
//! exported it; two struct values with equal fields but different type names
//! are different keys.

use alloc::boxed::Box;

use crate::hash::byte_hash;

/// Fatal-error message for hashing or comparing a kind without equality.
pub(crate) const UNCOMPARABLE: &str = "comparing un-comparable type";

/// The kind of a [`Dyn`] value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Kind {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// Pointer, observed as an address.
    Ptr,
    /// Channel handle, observed as an address.
    Chan,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Complex number with 32-bit parts.
    Complex64,
    /// Complex number with 64-bit parts.
    Complex128,
    /// Immutable string.
    Str,
    /// Fixed-length array.
    Array,
    /// Struct with named type and ordered fields.
    Struct,
    /// Function value; has no equality.
    Func,
    /// Slice header; has no equality.
    Slice,
}

/// A boxed dynamic value.
#[derive(Clone, Debug)]
pub enum Dyn {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Pointer, observed as its address.
    Ptr(usize),
    /// Channel handle, observed as its address.
    Chan(usize),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Complex number with 32-bit parts.
    Complex64 {
        /// Real part.
        re: f32,
        /// Imaginary part.
        im: f32,
    },
    /// Complex number with 64-bit parts.
    Complex128 {
        /// Real part.
        re: f64,
        /// Imaginary part.
        im: f64,
    },
    /// Immutable string.
    Str(Box<str>),
    /// Fixed-length array; the length is part of the dynamic type.
    Array(Box<[Dyn]>),
    /// Struct value.
    Struct {
        /// Name of the struct type; part of dynamic-type identity.
        name: &'static str,
        /// Every field in declaration order, unexported fields included.
        fields: Box<[Dyn]>,
    },
    /// Function value, observed as its address. Has no equality.
    Func(usize),
    /// Slice header, observed as its base address. Has no equality.
    Slice(usize),
}

impl Dyn {
    /// The value's kind.
    pub fn kind(&self) -> Kind {
        match self {
            Dyn::Bool(_) => Kind::Bool,
            Dyn::Int(_) => Kind::Int,
            Dyn::Uint(_) => Kind::Uint,
            Dyn::Ptr(_) => Kind::Ptr,
            Dyn::Chan(_) => Kind::Chan,
            Dyn::F32(_) => Kind::F32,
            Dyn::F64(_) => Kind::F64,
            Dyn::Complex64 { .. } => Kind::Complex64,
            Dyn::Complex128 { .. } => Kind::Complex128,
            Dyn::Str(_) => Kind::Str,
            Dyn::Array(_) => Kind::Array,
            Dyn::Struct { .. } => Kind::Struct,
            Dyn::Func(_) => Kind::Func,
            Dyn::Slice(_) => Kind::Slice,
        }
    }
}

impl PartialEq for Dyn {
    /// Dynamic-value equality: identical dynamic type, then structural
    /// comparison. Comparing two values of the same uncomparable kind is a
    /// fatal runtime error, matching the language's `==`.
    fn eq(&self, other: &Dyn) -> bool {
        match (self, other) {
            (Dyn::Bool(a), Dyn::Bool(b)) => a == b,
            (Dyn::Int(a), Dyn::Int(b)) => a == b,
            (Dyn::Uint(a), Dyn::Uint(b)) => a == b,
            (Dyn::Ptr(a), Dyn::Ptr(b)) => a == b,
            (Dyn::Chan(a), Dyn::Chan(b)) => a == b,
            (Dyn::F32(a), Dyn::F32(b)) => a == b,
            (Dyn::F64(a), Dyn::F64(b)) => a == b,
            (
                Dyn::Complex64 { re: ar, im: ai },
                Dyn::Complex64 { re: br, im: bi },
            ) => ar == br && ai == bi,
            (
                Dyn::Complex128 { re: ar, im: ai },
                Dyn::Complex128 { re: br, im: bi },
            ) => ar == br && ai == bi,
            (Dyn::Str(a), Dyn::Str(b)) => a == b,
            // Arrays of different lengths have different dynamic types.
            (Dyn::Array(a), Dyn::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (
                Dyn::Struct {
                    name: a_name,
                    fields: a_fields,
                },
                Dyn::Struct {
                    name: b_name,
                    fields: b_fields,
                },
            ) => {
                a_name == b_name
                    && a_fields.len() == b_fields.len()
                    && a_fields.iter().zip(b_fields.iter()).all(|(x, y)| x == y)
            }
            (Dyn::Func(_), Dyn::Func(_)) | (Dyn::Slice(_), Dyn::Slice(_)) => {
                panic!("{}", UNCOMPARABLE)
            }
            _ => false,
        }
    }
}

/// Hashes a dynamic value by structure under `seed`.
///
/// Defined recursively on the value's kind. Scalar kinds hash their raw
/// representation bytes; floats normalise negative zero first so that the
/// hash agrees with `-0.0 == 0.0`; complex, array, and struct kinds combine
/// member hashes with XOR. Reaching a kind without equality is a fatal
/// runtime error.
pub fn structural_hash(value: &Dyn, seed: u64) -> u32 {
    match value {
        Dyn::Bool(b) => byte_hash(&[*b as u8], seed),
        Dyn::Int(n) => byte_hash(&n.to_ne_bytes(), seed),
        Dyn::Uint(n) => byte_hash(&n.to_ne_bytes(), seed),
        Dyn::Ptr(p) | Dyn::Chan(p) => byte_hash(&p.to_ne_bytes(), seed),
        Dyn::F32(f) => float32_hash(f.to_bits(), seed),
        Dyn::F64(f) => float64_hash(f.to_bits(), seed),
        Dyn::Complex64 { re, im } => {
            float32_hash(re.to_bits(), seed) ^ float32_hash(im.to_bits(), seed)
        }
        Dyn::Complex128 { re, im } => {
            float64_hash(re.to_bits(), seed) ^ float64_hash(im.to_bits(), seed)
        }
        Dyn::Str(s) => byte_hash(s.as_bytes(), seed),
        Dyn::Array(elements) => elements
            .iter()
            .fold(0, |acc, element| acc ^ structural_hash(element, seed)),
        Dyn::Struct { fields, .. } => fields
            .iter()
            .fold(0, |acc, field| acc ^ structural_hash(field, seed)),
        Dyn::Func(_) | Dyn::Slice(_) => panic!("{}", UNCOMPARABLE),
    }
}

fn float32_hash(bits: u32, seed: u64) -> u32 {
    // -0.0 and 0.0 are equal keys, so they must hash alike.
    let bits = if bits == 0x8000_0000 { 0 } else { bits };
    byte_hash(&bits.to_ne_bytes(), seed)
}

fn float64_hash(bits: u64, seed: u64) -> u32 {
    let bits = if bits == 0x8000_0000_0000_0000 { 0 } else { bits };
    byte_hash(&bits.to_ne_bytes(), seed)
}
