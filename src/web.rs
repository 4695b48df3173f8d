use crate::{GenerateError, Idea, Phrasing, Store, StoreStats, generate, validate_keyword};
use askama::Template;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use include_dir::{Dir, include_dir};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, warn};

type SharedState = Arc<AppState>;

static ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/assets");

const EXAMPLE_KEYWORD: &str = "viagem rápida";
const EMPTY_KEYWORD: &str = "Keyword não pode estar vazia";
const INVALID_JSON: &str = "JSON inválido";
const UNKNOWN_ENDPOINT: &str = "Endpoint não encontrado";

pub struct AppState {
    pub store: Arc<Store>,
    pub phrasing: Phrasing,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub phrasing: Phrasing,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            phrasing: Phrasing::default(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig, store: Store) -> Result<(), WebError> {
    info!(
        %config.addr,
        phrasing = %config.phrasing,
        themes = store.themes().len(),
        source = %store.origin(),
        "Binding HTTP listener"
    );
    let state = Arc::new(AppState {
        store: Arc::new(store),
        phrasing: config.phrasing,
    });
    let router = build_router(state);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::EmptyInput => ApiError::bad_request(EMPTY_KEYWORD),
            other => {
                warn!(error = %other, "Idea generation failed");
                ApiError::internal(format!("Erro interno: {other}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home).fallback(unknown_endpoint))
        .route("/api", get(home).fallback(unknown_endpoint))
        .route("/index.html", get(home).fallback(unknown_endpoint))
        .route("/api/styles.css", get(styles).fallback(unknown_endpoint))
        .route("/api/script.js", get(script).fallback(unknown_endpoint))
        .route("/api/info", get(api_info).fallback(unknown_endpoint))
        .route("/temas", get(api_themes).fallback(unknown_endpoint))
        .route("/api/temas", get(api_themes).fallback(unknown_endpoint))
        .route("/api/stats", get(api_stats).fallback(unknown_endpoint))
        .route("/exemplo", get(api_example).fallback(unknown_endpoint))
        .route("/api/exemplo", get(api_example).fallback(unknown_endpoint))
        .route("/gerar-ideia", post(api_generate).fallback(unknown_endpoint))
        .route("/api/gerar-ideia", post(api_generate).fallback(unknown_endpoint))
        .route("/healthz", get(health).fallback(unknown_endpoint))
        .fallback(unknown_endpoint)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(cors_layer())
        .layer(CompressionLayer::new())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn home(State(state): State<SharedState>) -> Result<Html<String>, ApiError> {
    let template = HomeTemplate {
        version: env!("CARGO_PKG_VERSION"),
        themes: state.store.theme_names(),
        examples: state
            .store
            .themes()
            .iter()
            .filter_map(|theme| theme.keywords.first().map(String::as_str))
            .collect(),
        total_connectors: state.store.all_connectors().len(),
    };
    template
        .render()
        .map(Html)
        .map_err(|err| ApiError::internal(format!("Erro interno: {err}")))
}

async fn styles() -> Response {
    asset("styles.css", mime::TEXT_CSS_UTF_8)
}

async fn script() -> Response {
    asset("script.js", mime::APPLICATION_JAVASCRIPT_UTF_8)
}

fn asset(name: &str, content_type: mime::Mime) -> Response {
    match ASSETS.get_file(name) {
        Some(file) => (
            [(header::CONTENT_TYPE, content_type.to_string())],
            file.contents(),
        )
            .into_response(),
        None => ApiError::not_found(format!("Asset {name} not found")).into_response(),
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "oraculo-web" }))
}

async fn api_info() -> impl IntoResponse {
    Json(json!({
        "message": "Bem-vindo ao Oráculo Alucinado!",
        "description": "API que gera ideias alucinadas usando heurísticas",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /": "Interface web interativa",
            "POST /api/gerar-ideia": "Gera uma ideia alucinada baseada em keyword",
            "GET /api/temas": "Lista todos os temas disponíveis com estatísticas",
            "GET /api/stats": "Estatísticas detalhadas do banco de dados",
            "GET /api/exemplo": "Mostra um exemplo de uso",
            "GET /api/info": "Informações da API (JSON)",
        },
        "exemplo_uso": format!("POST /api/gerar-ideia com body: {{\"keyword\": \"{EXAMPLE_KEYWORD}\"}}"),
    }))
}

async fn api_themes(State(state): State<SharedState>) -> Json<ThemesPayload> {
    let names: Vec<String> = state
        .store
        .theme_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(ThemesPayload {
        total_temas: names.len(),
        temas_disponiveis: names,
        estatisticas: state.store.stats(),
    })
}

async fn api_stats(State(state): State<SharedState>) -> Json<StatsPayload> {
    Json(StatsPayload {
        database_stats: state.store.stats(),
        version: env!("CARGO_PKG_VERSION"),
        data_source: state.store.origin().to_string(),
    })
}

async fn api_example(State(state): State<SharedState>) -> Result<Json<ExamplePayload>, ApiError> {
    let idea = generate(EXAMPLE_KEYWORD, &state.store, state.phrasing)?;
    Ok(Json(ExamplePayload {
        exemplo_input: EXAMPLE_KEYWORD.to_string(),
        exemplo_output: idea,
    }))
}

async fn api_generate(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Idea>, ApiError> {
    // Clients are not required to send a JSON content type.
    let request: KeywordRequest = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "Rejected request body");
        ApiError::bad_request(INVALID_JSON)
    })?;
    let keyword = validate_keyword(&request.keyword)?;
    let idea = generate(keyword, &state.store, state.phrasing)?;
    Ok(Json(idea))
}

async fn unknown_endpoint() -> ApiError {
    ApiError::not_found(UNKNOWN_ENDPOINT)
}

#[derive(Debug, Deserialize)]
struct KeywordRequest {
    #[serde(default)]
    keyword: String,
}

#[derive(Debug, Serialize)]
struct ThemesPayload {
    temas_disponiveis: Vec<String>,
    total_temas: usize,
    estatisticas: StoreStats,
}

#[derive(Debug, Serialize)]
struct StatsPayload {
    database_stats: StoreStats,
    version: &'static str,
    data_source: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExamplePayload {
    exemplo_input: String,
    exemplo_output: Idea,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="pt-BR">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Oráculo Alucinado</title>
    <link rel="stylesheet" href="/api/styles.css">
    <script src="/api/script.js" defer></script>
  </head>
  <body>
    <main>
      <h1>Oráculo Alucinado</h1>
      <p class="lede">Digite uma palavra-chave e receba uma ideia de startup deliberadamente absurda.</p>
      <div class="form">
        <input id="keyword" type="text" placeholder="ex: viagem rápida" autocomplete="off">
        <button id="gerarBtn" type="button">Gerar Ideia Alucinada</button>
      </div>
      {% if examples.len() > 0 %}
      <div class="chips">
        {% for keyword in examples %}
        <button type="button" data-keyword="{{ keyword }}">{{ keyword }}</button>
        {% endfor %}
      </div>
      {% endif %}
      <div id="resultado"></div>
      <footer>
        <p id="temas-info">{{ themes.len() }} temas: {{ themes.join(", ") }}</p>
        <p>{{ total_connectors }} conectores carregados · v{{ version }}</p>
      </footer>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct HomeTemplate<'a> {
    version: &'static str,
    themes: Vec<&'a str>,
    examples: Vec<&'a str>,
    total_connectors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body, body::Body, http::Request};
    use std::collections::HashSet;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let state = Arc::new(AppState {
            store: Arc::new(Store::fallback()),
            phrasing: Phrasing::Portuguese,
        });
        build_router(state)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn generate_returns_idea() {
        let router = test_router();
        let response = router
            .oneshot(post_json(
                "/api/gerar-ideia",
                r#"{"keyword": "  I love blockchain "}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let idea: Idea = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(idea.requested_input, "I love blockchain");
        assert_eq!(idea.identified_theme, "Tecnologia");
        assert!(idea.generated_idea.starts_with("Criar uma plataforma de "));
        assert!(idea.distortion_factor.starts_with("Combinação de "));
    }

    #[tokio::test]
    async fn generate_without_api_prefix() {
        let router = test_router();
        let response = router
            .oneshot(post_json("/gerar-ideia", r#"{"keyword": "xyz123"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        let themes: HashSet<&str> = ["Tecnologia", "Saúde", "Viagem", "Comida"].into();
        assert!(themes.contains(payload["tema_identificado"].as_str().unwrap()));
    }

    #[tokio::test]
    async fn blank_keywords_are_client_errors() {
        for body in [r#"{"keyword": ""}"#, r#"{"keyword": "   "}"#, "{}"] {
            let response = test_router()
                .oneshot(post_json("/api/gerar-ideia", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            let payload = json_body(response).await;
            assert_eq!(payload["error"], EMPTY_KEYWORD);
            assert!(payload.get("ideia_alucinada").is_none());
        }
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let response = test_router()
            .oneshot(post_json("/api/gerar-ideia", "{keyword:"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], INVALID_JSON);
    }

    #[tokio::test]
    async fn generate_accepts_body_without_content_type() {
        let response = test_router()
            .oneshot(
                Request::post("/api/gerar-ideia")
                    .body(Body::from(r#"{"keyword":"viagem"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["tema_identificado"], "Viagem");
    }

    #[tokio::test]
    async fn wrong_method_is_json_404() {
        for request in [
            Request::get("/api/gerar-ideia").body(Body::empty()).unwrap(),
            post_json("/api/temas", "{}"),
            Request::delete("/healthz").body(Body::empty()).unwrap(),
        ] {
            let response = test_router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(json_body(response).await["error"], UNKNOWN_ENDPOINT);
        }
    }

    #[tokio::test]
    async fn themes_lists_store_order() {
        let response = test_router()
            .oneshot(Request::get("/api/temas").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let payload = json_body(response).await;
        assert_eq!(
            payload["temas_disponiveis"],
            json!(["tecnologia", "saúde", "viagem", "comida"])
        );
        assert_eq!(payload["total_temas"], 4);
        assert_eq!(payload["estatisticas"]["total_conectores"], 5);
        assert_eq!(
            payload["estatisticas"]["temas"]["saúde"]["keyword_count"],
            5
        );
    }

    #[tokio::test]
    async fn stats_report_data_source() {
        let response = test_router()
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let payload = json_body(response).await;
        assert_eq!(payload["data_source"], "embedded fallback dataset");
        assert_eq!(payload["database_stats"]["total_temas"], 4);
    }

    #[tokio::test]
    async fn example_uses_fixed_keyword() {
        let response = test_router()
            .oneshot(Request::get("/exemplo").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: ExamplePayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload.exemplo_input, EXAMPLE_KEYWORD);
        assert_eq!(payload.exemplo_output.identified_theme, "Viagem");
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let response = test_router()
            .oneshot(Request::get("/api/nada").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], UNKNOWN_ENDPOINT);
    }

    #[tokio::test]
    async fn cors_headers_on_responses_and_preflight() {
        let response = test_router()
            .oneshot(
                Request::get("/api/temas")
                    .header(header::ORIGIN, "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );

        let preflight = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/gerar-ideia")
                    .header(header::ORIGIN, "http://example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(preflight.status().is_success());
        assert_eq!(
            preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn home_page_lists_themes() {
        let response = test_router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("/api/script.js"));
        assert!(html.contains("tecnologia, saúde, viagem, comida"));
        assert!(html.contains("data-keyword=\"microchip\""));
    }

    #[tokio::test]
    async fn assets_have_content_types() {
        for (uri, expected) in [
            ("/api/script.js", "application/javascript; charset=utf-8"),
            ("/api/styles.css", "text/css; charset=utf-8"),
        ] {
            let response = test_router()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert!(response.status().is_success(), "{uri}");
            assert_eq!(response.headers()[header::CONTENT_TYPE], expected);
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
