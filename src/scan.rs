//! Copying column values into caller-owned destinations.
//!
//! A [`Destination`] is the set of places one row is scanned into. Tuples of
//! [`FromValue`] types are the usual choice; a slice of `&mut dyn ScanValue`
//! (see [`dests!`](crate::dests)) mirrors passing a list of pointers. Scanning
//! always overwrites the previous contents, so a destination only ever holds the
//! most recently scanned row.

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::SqlEssentialsError;
use crate::types::RowValues;

/// Conversion from a column value into a Rust value.
pub trait FromValue: Sized {
    /// # Errors
    /// Returns `ConversionError` when the value has an incompatible type.
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError>;
}

fn conversion_error(value: &RowValues, target: &str) -> SqlEssentialsError {
    SqlEssentialsError::ConversionError(format!(
        "cannot convert {} value into {target}",
        value.kind()
    ))
}

impl FromValue for RowValues {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        match value {
            RowValues::Int(i) => Ok(*i),
            RowValues::Bool(b) => Ok(i64::from(*b)),
            RowValues::Text(s) => s.trim().parse().map_err(|_| conversion_error(value, "i64")),
            _ => Err(conversion_error(value, "i64")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        let wide = i64::from_value(value).map_err(|_| conversion_error(value, "i32"))?;
        i32::try_from(wide).map_err(|_| {
            SqlEssentialsError::ConversionError(format!("value {wide} out of range for i32"))
        })
    }
}

impl FromValue for u64 {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        let wide = i64::from_value(value).map_err(|_| conversion_error(value, "u64"))?;
        u64::try_from(wide).map_err(|_| {
            SqlEssentialsError::ConversionError(format!("value {wide} out of range for u64"))
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        if let Some(f) = value.as_float() {
            return Ok(f);
        }
        match value {
            RowValues::Text(s) => s.trim().parse().map_err(|_| conversion_error(value, "f64")),
            _ => Err(conversion_error(value, "f64")),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        value.as_bool().ok_or_else(|| conversion_error(value, "bool"))
    }
}

impl FromValue for String {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        match value {
            RowValues::Text(s) => Ok(s.clone()),
            RowValues::Int(i) => Ok(i.to_string()),
            RowValues::Float(f) => Ok(f.to_string()),
            RowValues::Bool(b) => Ok(b.to_string()),
            RowValues::Timestamp(dt) => Ok(dt.format("%F %T%.f").to_string()),
            RowValues::JSON(v) => Ok(v.to_string()),
            RowValues::Blob(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| conversion_error(value, "String"))
            }
            RowValues::Null => Err(conversion_error(value, "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        match value {
            RowValues::Blob(bytes) => Ok(bytes.clone()),
            RowValues::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(conversion_error(value, "Vec<u8>")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        value
            .as_timestamp()
            .ok_or_else(|| conversion_error(value, "NaiveDateTime"))
    }
}

impl FromValue for JsonValue {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        match value {
            RowValues::Text(s) => serde_json::from_str(s)
                .map_err(|e| SqlEssentialsError::ConversionError(format!("invalid JSON: {e}"))),
            other => Ok(other.to_json()),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &RowValues) -> Result<Self, SqlEssentialsError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// A single place a column can be scanned into.
pub trait ScanValue: Send {
    /// # Errors
    /// Returns `ConversionError` when the value has an incompatible type.
    fn scan_value(&mut self, value: &RowValues) -> Result<(), SqlEssentialsError>;
}

impl<T: FromValue + Send> ScanValue for T {
    fn scan_value(&mut self, value: &RowValues) -> Result<(), SqlEssentialsError> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// The full set of places one row is scanned into.
pub trait Destination {
    /// Number of columns this destination accepts. Zero means "no destination".
    fn width(&self) -> usize;

    /// Overwrite the destination with `row`.
    ///
    /// # Errors
    /// Returns `ColumnMismatch` when the row width differs from [`width`](Self::width),
    /// or the conversion error of the first column that fails.
    fn scan_row(&mut self, row: &[RowValues]) -> Result<(), SqlEssentialsError>;
}

fn check_width(expected: usize, actual: usize) -> Result<(), SqlEssentialsError> {
    if expected == 0 {
        return Err(SqlEssentialsError::NoDestination);
    }
    if expected != actual {
        return Err(SqlEssentialsError::ColumnMismatch { expected, actual });
    }
    Ok(())
}

fn scan_into_slice(
    dests: &mut [&mut dyn ScanValue],
    row: &[RowValues],
) -> Result<(), SqlEssentialsError> {
    check_width(dests.len(), row.len())?;
    for (dest, value) in dests.iter_mut().zip(row) {
        dest.scan_value(value)?;
    }
    Ok(())
}

impl Destination for [&mut dyn ScanValue] {
    fn width(&self) -> usize {
        self.len()
    }

    fn scan_row(&mut self, row: &[RowValues]) -> Result<(), SqlEssentialsError> {
        scan_into_slice(self, row)
    }
}

impl<const N: usize> Destination for [&mut dyn ScanValue; N] {
    fn width(&self) -> usize {
        N
    }

    fn scan_row(&mut self, row: &[RowValues]) -> Result<(), SqlEssentialsError> {
        scan_into_slice(self.as_mut_slice(), row)
    }
}

impl Destination for Vec<&mut dyn ScanValue> {
    fn width(&self) -> usize {
        self.len()
    }

    fn scan_row(&mut self, row: &[RowValues]) -> Result<(), SqlEssentialsError> {
        scan_into_slice(self.as_mut_slice(), row)
    }
}

impl Destination for () {
    fn width(&self) -> usize {
        0
    }

    fn scan_row(&mut self, _row: &[RowValues]) -> Result<(), SqlEssentialsError> {
        Err(SqlEssentialsError::NoDestination)
    }
}

macro_rules! impl_destination_for_tuple {
    ($width:expr => $($idx:tt $ty:ident),+) => {
        impl<$($ty: FromValue),+> Destination for ($($ty,)+) {
            fn width(&self) -> usize {
                $width
            }

            fn scan_row(&mut self, row: &[RowValues]) -> Result<(), SqlEssentialsError> {
                check_width($width, row.len())?;
                *self = ($( $ty::from_value(&row[$idx])?, )+);
                Ok(())
            }
        }
    };
}

impl_destination_for_tuple!(1 => 0 A);
impl_destination_for_tuple!(2 => 0 A, 1 B);
impl_destination_for_tuple!(3 => 0 A, 1 B, 2 C);
impl_destination_for_tuple!(4 => 0 A, 1 B, 2 C, 3 D);
impl_destination_for_tuple!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_destination_for_tuple!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_destination_for_tuple!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_destination_for_tuple!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
impl_destination_for_tuple!(9 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I);
impl_destination_for_tuple!(10 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J);
impl_destination_for_tuple!(11 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K);
impl_destination_for_tuple!(12 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K, 11 L);

/// Build a destination array out of mutable references to scannable values.
///
/// ```rust
/// use sql_essentials::dests;
/// use sql_essentials::scan::Destination;
///
/// let mut id = 0_i64;
/// let mut name = String::new();
/// let mut dest = dests![&mut id, &mut name];
/// assert_eq!(dest.width(), 2);
/// ```
#[macro_export]
macro_rules! dests {
    () => {{
        let empty: [&mut dyn $crate::scan::ScanValue; 0] = [];
        empty
    }};
    ($($dest:expr),+ $(,)?) => {
        [$($dest as &mut dyn $crate::scan::ScanValue),+]
    };
}
