use crate::pq::PqResult;
use crate::type_id::PgTypeId;

// NUMERIC typmods carry a 4-byte header before the packed
// precision/scale word.
const TYPMOD_HEADER: i32 = 4;

/// Describes one column of a row-returning result.
///
/// One sequence of these forms a cursor's `description`, valid until the
/// next execute. `display_size` and `null_ok` are never populated; they
/// are carried so the descriptor keeps its customary seven-field shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Wire type of the column.
    pub type_id: PgTypeId,

    /// Always `None`.
    pub display_size: Option<i32>,

    /// Internal byte size of the type, or the type modifier for
    /// variable-width types.
    pub internal_size: i32,

    /// Numeric precision, for `NUMERIC` columns only.
    pub precision: Option<u16>,

    /// Numeric scale, for `NUMERIC` columns only.
    pub scale: Option<u16>,

    /// Always `None`.
    pub null_ok: Option<bool>,
}

impl Column {
    /// Build the descriptor for one field of a native result.
    pub(crate) fn from_result<R: PqResult>(result: &R, field: usize) -> Self {
        let type_id = PgTypeId(result.field_type(field));
        let fsize = result.field_size(field);

        let mut fmod = result.field_mod(field);
        if fmod > 0 {
            fmod -= TYPMOD_HEADER;
        }

        let internal_size = if fsize == -1 {
            if type_id == PgTypeId::NUMERIC {
                fmod >> 16
            } else {
                fmod
            }
        } else {
            fsize
        };

        let (precision, scale) = if type_id == PgTypeId::NUMERIC {
            decompose_numeric_typmod(fmod)
        } else {
            (None, None)
        };

        Self {
            name: result.field_name(field),
            type_id,
            display_size: None,
            internal_size,
            precision,
            scale,
            null_ok: None,
        }
    }
}

/// Split an already header-adjusted `NUMERIC` typmod into precision and
/// scale.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn decompose_numeric_typmod(fmod: i32) -> (Option<u16>, Option<u16>) {
    (Some(((fmod >> 16) & 0xFFFF) as u16), Some((fmod & 0xFFFF) as u16))
}

#[cfg(test)]
mod tests {
    use super::decompose_numeric_typmod;

    #[test]
    fn numeric_typmod_decomposes_into_precision_and_scale() {
        // numeric(10, 2): ((10 << 16) | 2) + 4, minus the header.
        let fmod = (10 << 16) | 2;
        assert_eq!(decompose_numeric_typmod(fmod), (Some(10), Some(2)));

        let fmod = (18 << 16) | 6;
        assert_eq!(decompose_numeric_typmod(fmod), (Some(18), Some(6)));
    }
}
