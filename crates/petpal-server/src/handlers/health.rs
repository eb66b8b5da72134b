use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "petpal-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
