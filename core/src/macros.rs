//! Internal helpers shared by the dtype-tagged tensor variants.

/// Match every element-type arm of a dtype-tagged enum with one generic body.
///
/// Each arm is monomorphic, so `$body` may call generic functions on the
/// bound value.
macro_rules! each_dtype {
    ($value:expr, $enum:ident, $inner:ident => $body:expr) => {
        match $value {
            $enum::F32($inner) => $body,
            $enum::F16($inner) => $body,
            $enum::I32($inner) => $body,
            $enum::U16($inner) => $body,
        }
    };
}
