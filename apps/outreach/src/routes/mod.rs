pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::campaign::handlers as campaigns;
use crate::cv::handlers as cvs;
use crate::mail::handlers as smtp;
use crate::matching::handlers as matches;
use crate::state::AppState;

/// Every tenant-scoped route names its tenant in the query string;
/// authentication happens in front of this service.
#[derive(Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

pub fn build_router(state: AppState) -> Router {
    // Multipart framing on top of the largest accepted CV.
    let upload_limit = state.config.cv.max_size_bytes() as usize + 64 * 1024;

    Router::new()
        .route("/health", get(health::health_handler))
        // CVs
        .route(
            "/api/v1/cvs",
            post(cvs::handle_upload_cv)
                .layer(DefaultBodyLimit::max(upload_limit))
                .get(cvs::handle_list_cvs),
        )
        .route(
            "/api/v1/cvs/:id",
            get(cvs::handle_get_cv).delete(cvs::handle_delete_cv),
        )
        .route("/api/v1/cvs/:id/keywords", get(cvs::handle_cv_keywords))
        .route("/api/v1/cvs/:id/parse", post(cvs::handle_parse_cv))
        // Matching
        .route("/api/v1/cvs/:id/matches", get(matches::handle_list_matches))
        .route(
            "/api/v1/cvs/:id/matches/compute",
            post(matches::handle_compute_matches),
        )
        .route(
            "/api/v1/cvs/:id/matches/recompute",
            post(matches::handle_recompute_matches),
        )
        // SMTP account
        .route(
            "/api/v1/smtp",
            put(smtp::handle_upsert_smtp).get(smtp::handle_get_smtp),
        )
        .route(
            "/api/v1/smtp/deactivate",
            post(smtp::handle_deactivate_smtp),
        )
        // Campaigns
        .route(
            "/api/v1/campaigns",
            post(campaigns::handle_create_campaign).get(campaigns::handle_list_campaigns),
        )
        .route(
            "/api/v1/campaigns/:id",
            get(campaigns::handle_get_campaign).delete(campaigns::handle_delete_campaign),
        )
        .route(
            "/api/v1/campaigns/:id/logs",
            get(campaigns::handle_campaign_logs),
        )
        .route(
            "/api/v1/campaigns/:id/schedule",
            post(campaigns::handle_schedule_campaign),
        )
        .route(
            "/api/v1/campaigns/:id/execute",
            post(campaigns::handle_execute_campaign),
        )
        .route(
            "/api/v1/campaigns/:id/cancel",
            post(campaigns::handle_cancel_campaign),
        )
        // Email logs
        .route(
            "/api/v1/logs/:id",
            get(campaigns::handle_get_log).put(campaigns::handle_update_log),
        )
        .route(
            "/api/v1/logs/:id/regenerate",
            post(campaigns::handle_regenerate_log),
        )
        .route("/api/v1/logs/:id/send", post(campaigns::handle_send_log))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::testkit::{completed_cv, Harness};

    fn app(h: &Harness) -> Router {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/outreach".to_string()),
            "LLM_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap();
        build_router(AppState {
            config,
            cvs: h.cvs.clone(),
            matching: h.matching.clone(),
            campaigns: h.campaigns.clone(),
            smtp: h.smtp.clone(),
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_route() {
        let h = Harness::new().await;
        let (status, body) = get_json(app(&h), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "outreach");
    }

    #[tokio::test]
    async fn test_cv_reads_are_tenant_scoped() {
        let h = Harness::new().await;
        let cv = completed_cv(&h, &[("transformer", 1.0)]).await;

        let (status, body) = get_json(
            app(&h),
            &format!("/api/v1/cvs/{}?tenant_id={}", cv.id, h.tenant_id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["parsing_status"], "COMPLETED");

        let (status, body) = get_json(
            app(&h),
            &format!("/api/v1/cvs/{}?tenant_id={}", cv.id, Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_keywords_listed_in_rank_order() {
        let h = Harness::new().await;
        let cv = completed_cv(&h, &[("transformer", 1.0), ("pytorch", 0.55)]).await;

        let (status, body) = get_json(
            app(&h),
            &format!("/api/v1/cvs/{}/keywords?tenant_id={}", cv.id, h.tenant_id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["normalized"], "transformer");
        assert_eq!(body[1]["weight"], 0.55);
    }

    #[tokio::test]
    async fn test_execute_unknown_campaign_is_not_found() {
        let h = Harness::new().await;
        let response = app(&h)
            .oneshot(
                Request::post(format!(
                    "/api/v1/campaigns/{}/execute?tenant_id={}",
                    Uuid::new_v4(),
                    h.tenant_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_rejected() {
        let h = Harness::new().await;
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{boundary}--\r\n"
        );
        let response = app(&h)
            .oneshot(
                Request::post(format!("/api/v1/cvs?tenant_id={}", h.tenant_id))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
