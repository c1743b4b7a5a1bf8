//! Conformance endpoint handler.

use axum::{http::HeaderMap, response::Response};
use edr_protocol::ConformanceClasses;

use super::metadata_response;
use crate::content_negotiation::check_metadata_accept;

/// GET /edr/conformance - Conformance classes
pub async fn conformance_handler(headers: HeaderMap) -> Response {
    if let Err(response) = check_metadata_accept(&headers) {
        return response;
    }
    metadata_response(&ConformanceClasses::current(), 3600)
}

#[cfg(test)]
mod tests {
    use edr_protocol::{conformance, ConformanceClasses};

    #[test]
    fn test_conformance_classes() {
        let conf = ConformanceClasses::current();

        assert!(conf.contains(conformance::CORE));
        assert!(conf.contains(conformance::COLLECTIONS));
        assert!(conf.contains(conformance::POSITION));
        assert!(conf.contains(conformance::AREA));
        assert!(conf.contains(conformance::INSTANCES));
        assert!(!conf.contains(conformance::COVJSON));
    }
}
