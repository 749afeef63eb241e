use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// 注册中心轮询的健康检查端点
async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Healthy")
}

/// 在 `base_path` 上挂载健康检查
pub fn router(base_path: &str) -> Router {
    let path = if base_path.starts_with('/') {
        base_path.to_string()
    } else {
        format!("/{}", base_path)
    };

    Router::new()
        .route(&path, get(health_check))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let response = router("/HealthCheck")
            .oneshot(Request::get("/HealthCheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Healthy");
    }

    #[tokio::test]
    async fn relative_base_path_is_mounted_at_root() {
        let response = router("status/live")
            .oneshot(Request::get("/status/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let response = router("/HealthCheck")
            .oneshot(Request::get("/api/projects").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
