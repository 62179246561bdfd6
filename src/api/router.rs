//! HTTP router.
//!
//! Returns a composable `Router`; `server::start_server` binds it, tests drive it
//! with `oneshot`.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

pub fn api_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/checklist", post(endpoints::checklist::generate))
        .route("/checklist/mode", get(endpoints::checklist::mode));

    Router::new()
        .route("/health", get(endpoints::health::check))
        .nest("/api", api)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::pipeline::checklist::{
        ChecklistEngine, EngineData, GenerationFailure, MockGenerationClient, ModelCandidates,
        ModelResolver,
    };

    fn test_router() -> Router {
        let client = Arc::new(MockGenerationClient::failing(GenerationFailure::Unconfigured(
            "no API key".into(),
        )));
        let models = ModelResolver::new(&ModelCandidates {
            override_model: None,
            primary: "gpt-4o".into(),
            secondary: "gpt-4-turbo".into(),
            conversation_fallback: "gpt-3.5-turbo".into(),
        });
        let engine = ChecklistEngine::from_data(client, EngineData::embedded().unwrap(), models);
        api_router(ApiContext::new(Arc::new(engine)))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_loaded_data() {
        let response = test_router().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["ruleSets"], 3);
        assert!(json["catalogDocuments"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn checklist_degrades_without_generation() {
        let request = post_json(
            "/api/checklist",
            r#"{"country": "US", "visaType": "student",
                "applicantContext": {"questionnaireAnswers": {"age": 16}, "riskScore": 0.2}}"#,
        );
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["mode"], "hybrid");
        assert_eq!(json["source"], "degraded_rules");
        let ids: Vec<&str> = json["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["documentId"].as_str().unwrap())
            .collect();
        assert_eq!(ids[0], "passport");
        assert!(ids.contains(&"parental_consent"));
        assert!(!ids.contains(&"ties_evidence"));
        assert_eq!(json["diagnostics"]["attempts"], 1);
    }

    #[tokio::test]
    async fn legacy_request_uses_static_fallback() {
        let request = post_json("/api/checklist", r#"{"country": "JP", "visaType": "tourist"}"#);
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["mode"], "legacy");
        assert_eq!(json["source"], "static_fallback");
        assert!(!json["items"].as_array().unwrap().is_empty());
        assert!(json["notes"][0].as_str().unwrap().contains("embassy"));
    }

    #[tokio::test]
    async fn invalid_country_is_400() {
        let request = post_json("/api/checklist", r#"{"country": "U5", "visaType": "tourist"}"#);
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn unknown_visa_type_is_400() {
        let request = post_json("/api/checklist", r#"{"country": "US", "visaType": "business"}"#);
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let request = post_json("/api/checklist", "{not json");
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mode_endpoint_reports_resolution() {
        let response = test_router()
            .oneshot(get("/api/checklist/mode?country=gb&visaType=tourist"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["mode"], "hybrid");

        let response = test_router()
            .oneshot(get("/api/checklist/mode?country=DE&visaType=student"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["mode"], "legacy");
    }

    #[tokio::test]
    async fn mode_endpoint_requires_parameters() {
        let response = test_router()
            .oneshot(get("/api/checklist/mode?country=US"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
