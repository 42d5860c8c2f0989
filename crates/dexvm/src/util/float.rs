use std::cmp::Ordering;
use std::fmt::{self, Debug, Display};
use std::ops;

macro_rules! float_binops {
    ($name:ident, $from_cvt:ident, $to_cvt:ident: $($trait:ident::$method:ident),*) => {
        $(
            impl ops::$trait for $name {
                type Output = Self;

                fn $method(self, rhs: Self) -> Self {
                    Self::$from_cvt(ops::$trait::$method(self.$to_cvt(), rhs.$to_cvt()))
                }
            }
        )*
    };
}

macro_rules! declare_float {
    ($name:ident, $float:ident, $bits:ty, $from_cvt:ident, $to_cvt:ident) => {
        /// A float compared and hashed by its bit pattern, so it can live in `Eq` values.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name($bits);

        impl $name {
            pub fn from_bits(bits: $bits) -> Self {
                Self(bits)
            }

            pub fn $from_cvt(value: $float) -> Self {
                Self(value.to_bits())
            }

            pub fn to_bits(self) -> $bits {
                self.0
            }

            pub fn $to_cvt(self) -> $float {
                $float::from_bits(self.0)
            }

            // `as` saturates and maps NaN to zero, which is exactly the JVM's f2i/d2i.
            pub fn to_int(self) -> i32 {
                self.$to_cvt() as i32
            }

            pub fn to_long(self) -> i64 {
                self.$to_cvt() as i64
            }
        }

        impl From<$float> for $name {
            fn from(value: $float) -> Self {
                Self::$from_cvt(value)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.$to_cvt())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Debug::fmt(self, f)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                self.$to_cvt().partial_cmp(&other.$to_cvt())
            }
        }

        impl ops::Neg for $name {
            type Output = Self;

            fn neg(self) -> Self {
                Self::$from_cvt(-self.$to_cvt())
            }
        }

        float_binops!($name, $from_cvt, $to_cvt: Add::add, Sub::sub, Mul::mul, Div::div, Rem::rem);
    };
}

declare_float!(F32, f32, u32, from_f32, to_f32);
declare_float!(F64, f64, u64, from_f64, to_f64);

impl F32 {
    pub fn promote(self) -> F64 {
        F64::from_f64(self.to_f32().into())
    }
}

impl F64 {
    pub fn demote(self) -> F32 {
        F32::from_f32(self.to_f64() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::{F32, F64};

    #[test]
    fn test_nan_conversion_is_zero() {
        assert_eq!(F32::from(f32::NAN).to_int(), 0);
        assert_eq!(F64::from(f64::NAN).to_long(), 0);
    }

    #[test]
    fn test_conversion_saturates() {
        assert_eq!(F64::from(1e300).to_int(), i32::MAX);
        assert_eq!(F32::from(-1e30).to_long(), i64::MIN);
    }

    #[test]
    fn test_rem_truncates() {
        assert_eq!((F64::from(-7.5) % F64::from(2.0)).to_f64(), -1.5);
    }

    #[test]
    fn test_negative_zero_is_distinct() {
        assert_ne!(-F32::from(0.0), F32::from(0.0));
        assert_eq!(F32::from(0.5).promote().to_f64(), 0.5);
    }
}
