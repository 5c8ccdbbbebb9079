use sg_common::http::HttpError;
use thiserror::Error;

use crate::DocKind;

/// The ERP's error code for "committing this document would drive stock negative".
/// Arrives as HTTP 412 with the code in the response body.
const INSUFFICIENT_STOCK_CODE: &str = "3007";

#[derive(Debug, Error)]
pub enum ErpApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),
    /// Soft and expected: the warehouse cannot cover the document's positions yet.
    #[error("Insufficient stock to commit {kind} {id}")]
    InsufficientStock { kind: DocKind, id: String },
    /// The destructive position replace died between deleting the old set and inserting
    /// the new one. The document now holds fewer positions than either set; the caller
    /// must re-sync it on the next pass rather than trust its contents.
    #[error("Position replace on {kind} {id} partially applied ({deleted}/{total} old positions deleted): {source}")]
    PartialPositionReplace {
        kind: DocKind,
        id: String,
        deleted: usize,
        total: usize,
        #[source]
        source: Box<ErpApiError>,
    },
}

impl ErpApiError {
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, ErpApiError::InsufficientStock { .. })
    }

    /// Reclassifies a raw transport error as [`ErpApiError::InsufficientStock`] when the
    /// ERP's 412 + error-code signature matches; anything else passes through.
    pub fn classify_commit_error(self, kind: DocKind, id: &str) -> Self {
        match &self {
            ErpApiError::Http(HttpError::Status { status: 412, body, .. }) if body.contains(INSUFFICIENT_STOCK_CODE) => {
                ErpApiError::InsufficientStock { kind, id: id.to_string() }
            },
            _ => self,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn status_error(status: u16, body: &str) -> ErpApiError {
        ErpApiError::Http(HttpError::Status { status, url: "http://erp/entity/transfer/t1".to_string(), body: body.to_string() })
    }

    #[test]
    fn code_3007_on_412_is_insufficient_stock() {
        let e = status_error(412, r#"{"errors":[{"error":"not enough stock","code":3007}]}"#)
            .classify_commit_error(DocKind::Transfer, "t1");
        assert!(e.is_insufficient_stock());
    }

    #[test]
    fn other_errors_pass_through() {
        let e = status_error(412, r#"{"errors":[{"code":1062}]}"#).classify_commit_error(DocKind::Transfer, "t1");
        assert!(!e.is_insufficient_stock());
        let e = status_error(400, "3007").classify_commit_error(DocKind::Transfer, "t1");
        assert!(!e.is_insufficient_stock());
    }
}
