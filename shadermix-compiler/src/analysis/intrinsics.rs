/// Intrinsic functions and the number of arguments they accept.
const INTRINSICS: &[(&str, usize, usize)] = &[
    ("abs", 1, 1),
    ("acos", 1, 1),
    ("all", 1, 1),
    ("AllMemoryBarrier", 0, 0),
    ("AllMemoryBarrierWithGroupSync", 0, 0),
    ("any", 1, 1),
    ("asdouble", 2, 2),
    ("asfloat", 1, 1),
    ("asin", 1, 1),
    ("asint", 1, 1),
    ("asuint", 1, 3),
    ("atan", 1, 1),
    ("atan2", 2, 2),
    ("ceil", 1, 1),
    ("clamp", 3, 3),
    ("clip", 1, 1),
    ("cos", 1, 1),
    ("cosh", 1, 1),
    ("countbits", 1, 1),
    ("cross", 2, 2),
    ("ddx", 1, 1),
    ("ddx_coarse", 1, 1),
    ("ddx_fine", 1, 1),
    ("ddy", 1, 1),
    ("ddy_coarse", 1, 1),
    ("ddy_fine", 1, 1),
    ("degrees", 1, 1),
    ("determinant", 1, 1),
    ("DeviceMemoryBarrier", 0, 0),
    ("DeviceMemoryBarrierWithGroupSync", 0, 0),
    ("distance", 2, 2),
    ("dot", 2, 2),
    ("exp", 1, 1),
    ("exp2", 1, 1),
    ("f16tof32", 1, 1),
    ("f32tof16", 1, 1),
    ("faceforward", 3, 3),
    ("firstbithigh", 1, 1),
    ("firstbitlow", 1, 1),
    ("floor", 1, 1),
    ("fma", 3, 3),
    ("fmod", 2, 2),
    ("frac", 1, 1),
    ("frexp", 2, 2),
    ("fwidth", 1, 1),
    ("GroupMemoryBarrier", 0, 0),
    ("GroupMemoryBarrierWithGroupSync", 0, 0),
    ("InterlockedAdd", 2, 3),
    ("InterlockedAnd", 2, 3),
    ("InterlockedCompareExchange", 4, 4),
    ("InterlockedExchange", 3, 3),
    ("InterlockedMax", 2, 3),
    ("InterlockedMin", 2, 3),
    ("InterlockedOr", 2, 3),
    ("InterlockedXor", 2, 3),
    ("isfinite", 1, 1),
    ("isinf", 1, 1),
    ("isnan", 1, 1),
    ("ldexp", 2, 2),
    ("length", 1, 1),
    ("lerp", 3, 3),
    ("lit", 3, 3),
    ("log", 1, 1),
    ("log10", 1, 1),
    ("log2", 1, 1),
    ("mad", 3, 3),
    ("max", 2, 2),
    ("min", 2, 2),
    ("modf", 2, 2),
    ("mul", 2, 2),
    ("noise", 1, 1),
    ("normalize", 1, 1),
    ("pow", 2, 2),
    ("radians", 1, 1),
    ("rcp", 1, 1),
    ("reflect", 2, 2),
    ("refract", 3, 3),
    ("reversebits", 1, 1),
    ("round", 1, 1),
    ("rsqrt", 1, 1),
    ("saturate", 1, 1),
    ("sign", 1, 1),
    ("sin", 1, 1),
    ("sincos", 3, 3),
    ("sinh", 1, 1),
    ("smoothstep", 3, 3),
    ("sqrt", 1, 1),
    ("step", 2, 2),
    ("tan", 1, 1),
    ("tanh", 1, 1),
    ("tex2D", 2, 4),
    ("texCUBE", 2, 4),
    ("transpose", 1, 1),
    ("trunc", 1, 1),
];

const SCALARS: &[&str] = &[
    "bool",
    "int",
    "uint",
    "dword",
    "half",
    "float",
    "double",
    "min16float",
    "min16int",
    "min16uint",
];

/// The `(min, max)` argument count of an intrinsic function.
pub fn intrinsic_arity(name: &str) -> Option<(usize, usize)> {
    INTRINSICS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, min, max)| (*min, *max))
}

fn dimension(c: u8) -> Option<u32> {
    (b'1'..=b'4').contains(&c).then(|| u32::from(c - b'0'))
}

/// A scalar, vector or matrix type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NumericType {
    /// The scalar component type, such as `float`.
    pub scalar: &'static str,
    pub rows: u32,
    pub columns: u32,
    pub is_matrix: bool,
}

/// Decompose a numeric type name. Scalars are `1x1` and vectors are one row.
pub fn numeric_type(name: &str) -> Option<NumericType> {
    SCALARS.iter().find_map(|scalar| {
        let rest = name.strip_prefix(scalar)?;
        let (rows, columns, is_matrix) = match rest.as_bytes() {
            [] => (1, 1, false),
            [n] => (1, dimension(*n)?, false),
            [rows, b'x', columns] => (dimension(*rows)?, dimension(*columns)?, true),
            _ => return None,
        };
        Some(NumericType {
            scalar: *scalar,
            rows,
            columns,
            is_matrix,
        })
    })
}

/// The `(rows, columns)` of a scalar, vector or matrix type.
pub fn numeric_dimensions(name: &str) -> Option<(u32, u32)> {
    numeric_type(name).map(|t| (t.rows, t.columns))
}

/// Whether `name` is a scalar, vector or matrix type, usable as a constructor.
pub fn is_numeric_type(name: &str) -> bool {
    numeric_dimensions(name).is_some()
}

#[cfg(test)]
mod test {
    use crate::analysis::intrinsics::{
        intrinsic_arity, is_numeric_type, numeric_dimensions, numeric_type,
    };

    #[test]
    fn numeric_types() {
        assert!(is_numeric_type("float"));
        assert!(is_numeric_type("float4"));
        assert!(is_numeric_type("uint2"));
        assert!(is_numeric_type("float4x4"));
        assert!(is_numeric_type("min16float3"));
        assert!(!is_numeric_type("float5"));
        assert!(!is_numeric_type("Texture2D"));
        assert!(!is_numeric_type("floaty"));
    }

    #[test]
    fn dimensions() {
        assert_eq!(Some((1, 1)), numeric_dimensions("float"));
        assert_eq!(Some((1, 3)), numeric_dimensions("float3"));
        assert_eq!(Some((4, 4)), numeric_dimensions("float4x4"));
        assert_eq!(Some((3, 2)), numeric_dimensions("half3x2"));
        assert_eq!(Some((1, 1)), numeric_dimensions("min16float"));
        assert_eq!(Some((1, 2)), numeric_dimensions("min16int2"));
        assert_eq!(None, numeric_dimensions("SamplerState"));

        let matrix = numeric_type("float1x4").unwrap();
        assert!(matrix.is_matrix);
        assert_eq!("float", matrix.scalar);
        assert!(!numeric_type("uint2").unwrap().is_matrix);
        assert_eq!("uint", numeric_type("uint2").unwrap().scalar);
    }

    #[test]
    fn arity() {
        assert_eq!(Some((3, 3)), intrinsic_arity("lerp"));
        assert_eq!(None, intrinsic_arity("Lerp"));
    }
}
