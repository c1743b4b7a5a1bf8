//! Landing page handler.

use axum::{extract::Extension, http::HeaderMap, response::Response};
use edr_protocol::LandingPage;
use std::sync::Arc;

use super::metadata_response;
use crate::content_negotiation::check_metadata_accept;
use crate::state::AppState;

/// GET /edr - Landing page
pub async fn landing_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_metadata_accept(&headers) {
        return response;
    }

    let landing = LandingPage::new(
        "Wave Forecast EDR API",
        "OGC API - Environmental Data Retrieval for gridded ocean wave forecasts",
        &state.base_url,
    );
    metadata_response(&landing, 300)
}

#[cfg(test)]
mod tests {
    use edr_protocol::LandingPage;

    #[test]
    fn test_landing_page_links() {
        let landing = LandingPage::new("Test API", "Test description", "http://localhost:8083/edr");

        assert!(landing.links.iter().any(|l| l.rel == "self"));
        assert!(landing.links.iter().any(|l| l.rel == "conformance"));
        assert!(landing.links.iter().any(|l| l.rel == "data"));
    }
}
