// Copyright (C) 2025 Barn Authors. This program is free software: you can
// redistribute it and/or modify it under the terms of the GNU General Public
// License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::var::{v_float, v_int, Var};
use crate::variant::Variant;
use crate::Error;
use crate::ErrorCode::{E_DIV, E_FLOAT, E_INVARG, E_TYPE};
use paste::paste;
use std::ops::{Mul, Neg, Sub};

/// Float results must stay finite; NaN and infinities raise E_FLOAT.
fn v_float_checked(f: f64) -> Result<Var, Error> {
    if !f.is_finite() {
        return Err(E_FLOAT.msg("floating-point result is not finite"));
    }
    Ok(v_float(f))
}

macro_rules! binary_numeric_coercion_op {
    ($op:tt) => {
        pub fn $op(&self, v: &Var) -> Result<Var, Error> {
            match (self.variant(), v.variant()) {
                (Variant::Float(l), Variant::Float(r)) => v_float_checked(l.$op(*r)),
                (Variant::Int(l), Variant::Int(r)) => {
                    paste! { l.[<checked_ $op>](*r).map(v_int).ok_or_else(|| E_INVARG.msg("integer overflow")) }
                }
                (Variant::Float(l), Variant::Int(r)) => v_float_checked(l.$op(*r as f64)),
                (Variant::Int(l), Variant::Float(r)) => v_float_checked((*l as f64).$op(*r)),
                (_, _) => Err(E_TYPE.msg("arithmetic on non-numeric value")),
            }
        }
    };
}

impl Var {
    binary_numeric_coercion_op!(mul);
    binary_numeric_coercion_op!(sub);

    pub fn add(&self, v: &Var) -> Result<Var, Error> {
        match (self.variant(), v.variant()) {
            (Variant::Float(l), Variant::Float(r)) => v_float_checked(l + r),
            (Variant::Int(l), Variant::Int(r)) => l
                .checked_add(*r)
                .map(v_int)
                .ok_or_else(|| E_INVARG.msg("integer overflow")),
            (Variant::Float(l), Variant::Int(r)) => v_float_checked(l + *r as f64),
            (Variant::Int(l), Variant::Float(r)) => v_float_checked(*l as f64 + r),
            (Variant::Str(l), Variant::Str(r)) => Ok(l.append(r)),
            (_, _) => Err(E_TYPE.msg("addition on mismatched types")),
        }
    }

    /// Division truncates toward zero on integers.
    pub fn div(&self, v: &Var) -> Result<Var, Error> {
        match (self.variant(), v.variant()) {
            (_, Variant::Int(0)) => Err(E_DIV.into()),
            (_, Variant::Float(r)) if *r == 0.0 => Err(E_DIV.into()),
            (Variant::Int(l), Variant::Int(r)) => l
                .checked_div(*r)
                .map(v_int)
                .ok_or_else(|| E_INVARG.msg("integer overflow")),
            (Variant::Float(l), Variant::Float(r)) => v_float_checked(l / r),
            (Variant::Float(l), Variant::Int(r)) => v_float_checked(l / *r as f64),
            (Variant::Int(l), Variant::Float(r)) => v_float_checked(*l as f64 / r),
            (_, _) => Err(E_TYPE.msg("arithmetic on non-numeric value")),
        }
    }

    /// Floored modulo: the result takes the sign of the divisor.
    pub fn modulus(&self, v: &Var) -> Result<Var, Error> {
        match (self.variant(), v.variant()) {
            (_, Variant::Int(0)) => Err(E_DIV.into()),
            (_, Variant::Float(r)) if *r == 0.0 => Err(E_DIV.into()),
            (Variant::Int(l), Variant::Int(r)) => {
                let m = l.checked_rem(*r).ok_or_else(|| E_INVARG.msg("integer overflow"))?;
                let m = if m != 0 && (m < 0) != (*r < 0) { m + r } else { m };
                Ok(v_int(m))
            }
            (Variant::Float(l), Variant::Float(r)) => v_float_checked(floored_fmod(*l, *r)),
            (Variant::Float(l), Variant::Int(r)) => v_float_checked(floored_fmod(*l, *r as f64)),
            (Variant::Int(l), Variant::Float(r)) => v_float_checked(floored_fmod(*l as f64, *r)),
            (_, _) => Err(E_TYPE.msg("arithmetic on non-numeric value")),
        }
    }

    pub fn pow(&self, v: &Var) -> Result<Var, Error> {
        match (self.variant(), v.variant()) {
            (Variant::Int(l), Variant::Int(r)) => {
                let r = u32::try_from(*r).map_err(|_| E_INVARG.msg("negative exponent"))?;
                l.checked_pow(r)
                    .map(v_int)
                    .ok_or_else(|| E_INVARG.msg("integer overflow"))
            }
            (Variant::Float(l), Variant::Float(r)) => v_float_checked(l.powf(*r)),
            (Variant::Float(l), Variant::Int(r)) => {
                let r = i32::try_from(*r).map_err(|_| E_INVARG.msg("exponent out of range"))?;
                v_float_checked(l.powi(r))
            }
            (Variant::Int(l), Variant::Float(r)) => v_float_checked((*l as f64).powf(*r)),
            (_, _) => Err(E_TYPE.msg("arithmetic on non-numeric value")),
        }
    }

    pub fn negative(&self) -> Result<Var, Error> {
        match self.variant() {
            Variant::Int(l) => l
                .checked_neg()
                .map(v_int)
                .ok_or_else(|| E_INVARG.msg("integer overflow")),
            Variant::Float(f) => Ok(v_float(f.neg())),
            _ => Err(E_TYPE.msg("negation of non-numeric value")),
        }
    }

    /// Left shift. Shifting by 64 or more yields 0; negative counts are E_INVARG.
    pub fn shl(&self, v: &Var) -> Result<Var, Error> {
        let (l, r) = both_ints(self, v)?;
        if r < 0 {
            return Err(E_INVARG.msg("negative shift count"));
        }
        if r >= 64 {
            return Ok(v_int(0));
        }
        Ok(v_int(((l as u64) << r) as i64))
    }

    /// Logical (zero-fill) right shift.
    pub fn shr(&self, v: &Var) -> Result<Var, Error> {
        let (l, r) = both_ints(self, v)?;
        if r < 0 {
            return Err(E_INVARG.msg("negative shift count"));
        }
        if r >= 64 {
            return Ok(v_int(0));
        }
        Ok(v_int(((l as u64) >> r) as i64))
    }

    pub fn bitand(&self, v: &Var) -> Result<Var, Error> {
        let (l, r) = both_ints(self, v)?;
        Ok(v_int(l & r))
    }

    pub fn bitor(&self, v: &Var) -> Result<Var, Error> {
        let (l, r) = both_ints(self, v)?;
        Ok(v_int(l | r))
    }

    pub fn bitxor(&self, v: &Var) -> Result<Var, Error> {
        let (l, r) = both_ints(self, v)?;
        Ok(v_int(l ^ r))
    }
}

fn both_ints(l: &Var, r: &Var) -> Result<(i64, i64), Error> {
    match (l.variant(), r.variant()) {
        (Variant::Int(l), Variant::Int(r)) => Ok((*l, *r)),
        (_, _) => Err(E_TYPE.msg("bitwise operation on non-integer value")),
    }
}

fn floored_fmod(l: f64, r: f64) -> f64 {
    l - r * (l / r).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::v_str;
    use crate::ErrorCode::{E_DIV, E_INVARG, E_TYPE};

    #[test]
    fn add_promotes_and_concatenates() {
        assert_eq!(v_int(1).add(&v_int(2)).unwrap(), v_int(3));
        assert_eq!(v_int(1).add(&v_float(2.0)).unwrap(), v_float(3.0));
        assert_eq!(v_str("a").add(&v_str("b")).unwrap(), v_str("ab"));
        assert_eq!(v_str("a").add(&v_int(1)).unwrap_err().code, E_TYPE);
    }

    #[test]
    fn division_truncates_toward_zero() {
        assert_eq!(v_int(7).div(&v_int(2)).unwrap(), v_int(3));
        assert_eq!(v_int(-7).div(&v_int(2)).unwrap(), v_int(-3));
        assert_eq!(v_int(1).div(&v_int(0)).unwrap_err().code, E_DIV);
        assert_eq!(v_float(1.0).div(&v_float(0.0)).unwrap_err().code, E_DIV);
    }

    #[test]
    fn modulo_is_floored() {
        assert_eq!(v_int(7).modulus(&v_int(3)).unwrap(), v_int(1));
        assert_eq!(v_int(-7).modulus(&v_int(3)).unwrap(), v_int(2));
        assert_eq!(v_int(7).modulus(&v_int(-3)).unwrap(), v_int(-2));
        assert_eq!(v_int(-7).modulus(&v_int(-3)).unwrap(), v_int(-1));
        assert_eq!(v_float(-7.0).modulus(&v_int(3)).unwrap(), v_float(2.0));
    }

    #[test]
    fn shifts() {
        assert_eq!(v_int(1).shl(&v_int(3)).unwrap(), v_int(8));
        assert_eq!(v_int(1).shl(&v_int(64)).unwrap(), v_int(0));
        assert_eq!(v_int(-1).shr(&v_int(1)).unwrap(), v_int(i64::MAX));
        assert_eq!(v_int(8).shr(&v_int(2)).unwrap(), v_int(2));
        assert_eq!(v_int(1).shl(&v_int(-1)).unwrap_err().code, E_INVARG);
    }

    #[test]
    fn overflow_raises() {
        assert_eq!(
            v_int(i64::MAX).add(&v_int(1)).unwrap_err().code,
            E_INVARG
        );
    }

    #[test]
    fn float_domain_errors() {
        // Overflowing to infinity is a float error, not a wraparound.
        assert_eq!(
            v_float(f64::MAX).mul(&v_float(2.0)).unwrap_err().code,
            crate::ErrorCode::E_FLOAT
        );
    }
}
