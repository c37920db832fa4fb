//! Catalog error types

use thiserror::Error;

use crate::upstream::UpstreamError;

/// Errors that abort an index build or reject a lookup
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The tariff service failed while paging (anything but 404/422)
    #[error("failed to fetch codes page {page}")]
    Upstream {
        page: u32,
        #[source]
        source: UpstreamError,
    },

    /// A request parameter cannot be sent upstream
    #[error("invalid {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
}

impl CatalogError {
    /// Render the error with its whole source chain, `outer: inner: root`
    pub fn render_chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }
}
