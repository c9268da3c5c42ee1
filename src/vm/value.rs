/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The core value representation.
//!
//! A `Value` is a storage location that can hold any language value: a
//! double, one of the singletons (`null`, `true`, `false`, and the internal
//! `undefined`), or a reference to a heap object. Booleans, numbers, and null
//! are unboxed; everything else lives on the heap and the value holds a
//! pointer.
//!
//! Two encodings are supported behind the `nan-tagging` cargo feature. The
//! default packs everything into one 64-bit word using NaN space; the
//! fallback is a discriminant plus a `{double, pointer}` union. Both expose
//! the same API and identical semantics.

use crate::gc::ptr::Gc;
use crate::vm::class::ObjClass;
use crate::vm::fiber::ObjFiber;
use crate::vm::foreign::ObjForeign;
use crate::vm::function::{ObjClosure, ObjFn, ObjUpvalue};
use crate::vm::instance::ObjInstance;
use crate::vm::list::ObjList;
use crate::vm::map::ObjMap;
use crate::vm::module::ObjModule;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::range::ObjRange;
use crate::vm::string::ObjString;

cfg_if::cfg_if! {
    if #[cfg(feature = "nan-tagging")] {
        /*
         * An IEEE 754 double-precision float is a 64-bit value with bits laid
         * out like:
         *
         * 1 Sign bit
         * | 11 Exponent bits
         * | |          52 Mantissa (i.e. fraction) bits
         * | |          |
         * S[Exponent-][Mantissa------------------------------------------]
         *
         * Any value where all exponent bits are set is a NaN, and quiet NaNs
         * additionally set the highest mantissa bit. Every bit pattern with
         * the quiet-NaN bits set but a non-zero remainder is unused by real
         * arithmetic, so we stuff our non-number values in there. The sign
         * bit distinguishes heap pointers from singletons:
         *
         * v--Pointer or singleton?
         * S[NaN      ]1---------------------------------------------------
         *
         * For singletons the low three mantissa bits carry an identifier;
         * the remaining identifier space is reserved. For pointers the low
         * mantissa bits hold the address itself, which fits comfortably in
         * the space modern hardware actually uses for addresses. Doubles are
         * stored as their own bit pattern, untouched, so arithmetic pays no
         * unpacking cost.
         */

        /// A mask that selects the sign bit.
        const SIGN_BIT: u64 = 1 << 63;

        /// The bits that must be set to indicate a quiet NaN.
        const QNAN: u64 = 0x7ffc_0000_0000_0000;

        const MASK_TAG: u64 = 7;

        const TAG_NULL: u64 = 1;
        const TAG_FALSE: u64 = 2;
        const TAG_TRUE: u64 = 3;
        const TAG_UNDEFINED: u64 = 4;
        // Identifiers 5 through 7 are reserved for future singleton kinds.
        // There is deliberately no way to construct a value carrying them.

        #[derive(Copy, Clone)]
        #[repr(transparent)]
        pub struct Value(u64);

        impl Value {
            fn singleton(tag: u64) -> Self {
                debug_assert!((TAG_NULL..=TAG_UNDEFINED).contains(&tag));
                Value(QNAN | tag)
            }

            pub fn null() -> Self {
                Self::singleton(TAG_NULL)
            }

            pub fn true_() -> Self {
                Self::singleton(TAG_TRUE)
            }

            pub fn false_() -> Self {
                Self::singleton(TAG_FALSE)
            }

            pub fn undefined() -> Self {
                Self::singleton(TAG_UNDEFINED)
            }

            pub fn from_double(num: f64) -> Self {
                Value(num.to_bits())
            }

            pub fn to_double(self) -> f64 {
                debug_assert!(self.is_num());
                f64::from_bits(self.0)
            }

            pub fn from_obj(obj: Gc<ObjHeader>) -> Self {
                debug_assert!(obj.is_not_null());
                Value(SIGN_BIT | QNAN | obj.raw() as u64)
            }

            pub fn as_obj(self) -> Gc<ObjHeader> {
                debug_assert!(self.is_obj());
                Gc::from_raw((self.0 & !(SIGN_BIT | QNAN)) as usize as *mut ObjHeader)
            }

            /// If the NaN bits are set, it's not a number.
            pub fn is_num(self) -> bool {
                (self.0 & QNAN) != QNAN
            }

            /// An object pointer is a NaN with a set sign bit.
            pub fn is_obj(self) -> bool {
                (self.0 & (QNAN | SIGN_BIT)) == (QNAN | SIGN_BIT)
            }

            pub fn is_null(self) -> bool {
                self.0 == Self::null().0
            }

            pub fn is_undefined(self) -> bool {
                self.0 == Self::undefined().0
            }

            pub fn is_true(self) -> bool {
                self.0 == Self::true_().0
            }

            pub fn is_false(self) -> bool {
                self.0 == Self::false_().0
            }

            pub fn is_bool(self) -> bool {
                self.is_true() || self.is_false()
            }

            pub fn singleton_tag(self) -> u64 {
                debug_assert!(!self.is_num() && !self.is_obj());
                self.0 & MASK_TAG
            }

            /// The raw 64-bit pattern, used for hashing and bit-identity
            /// checks.
            pub fn to_bits(self) -> u64 {
                self.0
            }
        }

        impl PartialEq for Value {
            /// Value types have unique bit representations and object types
            /// compare by identity, so comparing the bits is all there is.
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }
    } else {
        #[derive(Copy, Clone, PartialEq, Eq, Debug)]
        #[repr(u8)]
        enum Tag {
            Null,
            False,
            True,
            Undefined,
            Num,
            Obj,
        }

        #[derive(Copy, Clone)]
        union Payload {
            num: f64,
            obj: *mut ObjHeader,
            empty: (),
        }

        /// The debugging-friendly encoding: an explicit discriminant plus a
        /// `{double, pointer}` union.
        #[derive(Copy, Clone)]
        pub struct Value {
            tag: Tag,
            u: Payload,
        }

        impl Value {
            fn singleton(tag: Tag) -> Self {
                Value { tag, u: Payload { empty: () } }
            }

            pub fn null() -> Self {
                Self::singleton(Tag::Null)
            }

            pub fn true_() -> Self {
                Self::singleton(Tag::True)
            }

            pub fn false_() -> Self {
                Self::singleton(Tag::False)
            }

            pub fn undefined() -> Self {
                Self::singleton(Tag::Undefined)
            }

            pub fn from_double(num: f64) -> Self {
                Value { tag: Tag::Num, u: Payload { num } }
            }

            pub fn to_double(self) -> f64 {
                debug_assert!(self.is_num());
                unsafe { self.u.num }
            }

            pub fn from_obj(obj: Gc<ObjHeader>) -> Self {
                debug_assert!(obj.is_not_null());
                Value { tag: Tag::Obj, u: Payload { obj: obj.raw() } }
            }

            pub fn as_obj(self) -> Gc<ObjHeader> {
                debug_assert!(self.is_obj());
                Gc::from_raw(unsafe { self.u.obj })
            }

            pub fn is_num(self) -> bool {
                self.tag == Tag::Num
            }

            pub fn is_obj(self) -> bool {
                self.tag == Tag::Obj
            }

            pub fn is_null(self) -> bool {
                self.tag == Tag::Null
            }

            pub fn is_undefined(self) -> bool {
                self.tag == Tag::Undefined
            }

            pub fn is_true(self) -> bool {
                self.tag == Tag::True
            }

            pub fn is_false(self) -> bool {
                self.tag == Tag::False
            }

            pub fn is_bool(self) -> bool {
                self.tag == Tag::True || self.tag == Tag::False
            }

            /// A synthesized bit pattern for hashing; mirrors what the
            /// NaN-boxed encoding stores directly.
            pub fn to_bits(self) -> u64 {
                match self.tag {
                    Tag::Num => self.to_double().to_bits(),
                    Tag::Obj => unsafe { self.u.obj as u64 },
                    Tag::Null => 1,
                    Tag::False => 2,
                    Tag::True => 3,
                    Tag::Undefined => 4,
                }
            }
        }

        impl PartialEq for Value {
            fn eq(&self, other: &Self) -> bool {
                if self.tag != other.tag {
                    return false;
                }
                match self.tag {
                    Tag::Num => self.to_double().to_bits() == other.to_double().to_bits(),
                    Tag::Obj => unsafe { self.u.obj == other.u.obj },
                    _ => true,
                }
            }
        }
    }
}

// Encoding-independent helpers.
impl Value {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::true_()
        } else {
            Self::false_()
        }
    }

    pub fn to_bool(self) -> bool {
        self.is_true()
    }

    /// `false` and `null` are falsy; everything else is truthy.
    pub fn is_falsy(self) -> bool {
        self.is_false() || self.is_null()
    }

    fn is_obj_kind(self, kind: ObjKind) -> bool {
        self.is_obj() && self.as_obj().kind == kind
    }

    pub fn is_class(self) -> bool {
        self.is_obj_kind(ObjKind::Class)
    }

    pub fn is_closure(self) -> bool {
        self.is_obj_kind(ObjKind::Closure)
    }

    pub fn is_fiber(self) -> bool {
        self.is_obj_kind(ObjKind::Fiber)
    }

    pub fn is_fn(self) -> bool {
        self.is_obj_kind(ObjKind::Fn)
    }

    pub fn is_foreign(self) -> bool {
        self.is_obj_kind(ObjKind::Foreign)
    }

    pub fn is_instance(self) -> bool {
        self.is_obj_kind(ObjKind::Instance)
    }

    pub fn is_list(self) -> bool {
        self.is_obj_kind(ObjKind::List)
    }

    pub fn is_map(self) -> bool {
        self.is_obj_kind(ObjKind::Map)
    }

    pub fn is_module(self) -> bool {
        self.is_obj_kind(ObjKind::Module)
    }

    pub fn is_range(self) -> bool {
        self.is_obj_kind(ObjKind::Range)
    }

    pub fn is_string(self) -> bool {
        self.is_obj_kind(ObjKind::String)
    }

    pub fn as_class(self) -> Gc<ObjClass> {
        debug_assert!(self.is_class());
        self.as_obj().cast()
    }

    pub fn as_closure(self) -> Gc<ObjClosure> {
        debug_assert!(self.is_closure());
        self.as_obj().cast()
    }

    pub fn as_fiber(self) -> Gc<ObjFiber> {
        debug_assert!(self.is_fiber());
        self.as_obj().cast()
    }

    pub fn as_fn(self) -> Gc<ObjFn> {
        debug_assert!(self.is_fn());
        self.as_obj().cast()
    }

    pub fn as_foreign(self) -> Gc<ObjForeign> {
        debug_assert!(self.is_foreign());
        self.as_obj().cast()
    }

    pub fn as_instance(self) -> Gc<ObjInstance> {
        debug_assert!(self.is_instance());
        self.as_obj().cast()
    }

    pub fn as_list(self) -> Gc<ObjList> {
        debug_assert!(self.is_list());
        self.as_obj().cast()
    }

    pub fn as_map(self) -> Gc<ObjMap> {
        debug_assert!(self.is_map());
        self.as_obj().cast()
    }

    pub fn as_module(self) -> Gc<ObjModule> {
        debug_assert!(self.is_module());
        self.as_obj().cast()
    }

    pub fn as_range(self) -> Gc<ObjRange> {
        debug_assert!(self.is_range());
        self.as_obj().cast()
    }

    pub fn as_string(self) -> Gc<ObjString> {
        debug_assert!(self.is_string());
        self.as_obj().cast()
    }

    pub fn as_upvalue(self) -> Gc<ObjUpvalue> {
        debug_assert!(self.is_obj() && self.as_obj().kind == ObjKind::Upvalue);
        self.as_obj().cast()
    }
}

/// Structural equality: immutable value-like objects (strings and ranges)
/// compare by contents, everything else by the identity that [`PartialEq`]
/// already checks.
pub fn values_equal(a: Value, b: Value) -> bool {
    if a == b {
        return true;
    }

    // Must both be heap objects of the same kind.
    if !a.is_obj() || !b.is_obj() {
        return false;
    }
    let a_obj = a.as_obj();
    let b_obj = b.as_obj();
    if a_obj.kind != b_obj.kind {
        return false;
    }

    match a_obj.kind {
        ObjKind::String => {
            let a_str: Gc<ObjString> = a_obj.cast();
            let b_str: Gc<ObjString> = b_obj.cast();
            a_str.hash == b_str.hash && a_str.as_bytes() == b_str.as_bytes()
        }
        ObjKind::Range => {
            let a_range: Gc<ObjRange> = a_obj.cast();
            let b_range: Gc<ObjRange> = b_obj.cast();
            a_range.from == b_range.from
                && a_range.to == b_range.to
                && a_range.is_inclusive == b_range.is_inclusive
        }
        _ => false,
    }
}
