pub mod callbacks;
pub mod health;
pub mod payments;

use axum::http::{header, HeaderMap};

use crate::schemas::DataFormat;

pub(crate) fn data_format(headers: &HeaderMap) -> DataFormat {
    let value = |name| headers.get(name).and_then(|v| v.to_str().ok());
    DataFormat::from_headers(value(header::ACCEPT), value(header::CONTENT_TYPE))
}
