//! Binding [`ColumnValue`]s as statement parameters.

use bytes::BytesMut;
use std::error::Error;
use sync_core::ColumnValue;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A [`ColumnValue`] bound to a parameter of whatever type the server inferred.
///
/// Integers are narrowed to the column's width and timestamps are converted
/// between the zoned and naive forms as needed. Any other mismatch is an
/// encoding error rather than silently sending the wrong wire format.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a ColumnValue);

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            ColumnValue::Null => Ok(IsNull::Yes),
            ColumnValue::Boolean(b) => encode(b, ty, out),
            ColumnValue::Integer(i) => match *ty {
                Type::INT2 => encode(&i16::try_from(*i)?, ty, out),
                Type::INT4 => encode(&i32::try_from(*i)?, ty, out),
                _ => encode(i, ty, out),
            },
            ColumnValue::Text(s) => encode(&s.as_str(), ty, out),
            ColumnValue::Uuid(u) => encode(u, ty, out),
            ColumnValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMPTZ => encode(&ts.and_utc(), ty, out),
                _ => encode(ts, ty, out),
            },
            ColumnValue::TimestampTz(ts) => match *ty {
                Type::TIMESTAMP => encode(&ts.naive_utc(), ty, out),
                _ => encode(ts, ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn encode<T: ToSql>(
    value: &T,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    if !T::accepts(ty) {
        return Err(format!(
            "cannot encode {} as PostgreSQL type {ty}",
            std::any::type_name::<T>()
        )
        .into());
    }
    value.to_sql(ty, out)
}

/// Wraps each value for use with `Client::execute`.
pub fn params<'a>(values: &[&'a ColumnValue]) -> Vec<PgParam<'a>> {
    values.iter().map(|v| PgParam(*v)).collect()
}

/// Borrows wrapped values as the trait objects `execute` expects.
pub fn as_refs<'a>(params: &'a [PgParam<'_>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}
