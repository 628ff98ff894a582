use crate::country_codes::country_code;
use crate::errors::ApiError;
use crate::ledger::Ledger;
use crate::model::CountryTally;
use crate::model::CountryTotal;
use anyhow::anyhow;
use anyhow::Context;
use chrono::SecondsFormat;
use chrono::Utc;
use dropshot::endpoint;
use dropshot::ApiDescription;
use dropshot::ConfigDropshot;
use dropshot::HttpError;
use dropshot::HttpServerStarter;
use dropshot::Path;
use dropshot::RequestContext;
use dropshot::UntypedBody;
use http::header;
use http::Method;
use http::Response;
use http::StatusCode;
use hyper::Body;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use slog::debug;
use slog::error;
use slog::info;

/// The server-wide context is the click ledger
pub struct ApiContext {
    ledger: Ledger,
}

impl ApiContext {
    fn new(ledger: Ledger) -> ApiContext {
        ApiContext { ledger }
    }
}

struct ErrorWrap(anyhow::Error);
impl From<ErrorWrap> for HttpError {
    fn from(value: ErrorWrap) -> Self {
        let message = format!("{:#}", value.0);
        dropshot::HttpError {
            status_code: http::StatusCode::INTERNAL_SERVER_ERROR,
            error_code: None,
            external_message: message.clone(),
            internal_message: message,
        }
    }
}

pub async fn create_dropshot_server(
    config_dropshot: ConfigDropshot,
    log: slog::Logger,
    ledger: Ledger,
) -> anyhow::Result<dropshot::HttpServer<ApiContext>> {
    let mut api = ApiDescription::new();
    api.register(api_get)
        .map_err(|error| anyhow!("registering GET handler: {}", error))?;
    api.register(api_post)
        .map_err(|error| anyhow!("registering POST handler: {}", error))?;
    api.register(api_put)
        .map_err(|error| anyhow!("registering PUT handler: {}", error))?;
    api.register(api_patch)
        .map_err(|error| anyhow!("registering PATCH handler: {}", error))?;
    api.register(api_delete)
        .map_err(|error| anyhow!("registering DELETE handler: {}", error))?;
    api.register(api_options)
        .map_err(|error| anyhow!("registering OPTIONS handler: {}", error))?;

    let api_context = ApiContext::new(ledger);

    Ok(HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow!("creating Dropshot server: {:#}", error))?
        .start())
}

#[derive(Deserialize, JsonSchema)]
struct AnyPath {
    path: Vec<String>,
}

/// Query parameters understood by `GET /country-code`.
#[derive(Debug, Deserialize)]
struct LookupQuery {
    country: Option<String>,
    code: Option<String>,
}

impl LookupQuery {
    fn parse(query: Option<&str>) -> Result<LookupQuery, ApiError> {
        serde_urlencoded::from_str(query.unwrap_or("")).map_err(|error| {
            ApiError::validation(format!("Invalid query string: {}", error))
        })
    }
}

// Routing happens in `dispatch` so that unmatched paths get the same JSON
// envelope and CORS headers as everything else.  Every method is
// registered for the same reason; query strings are left raw for the
// routes that want them.

async fn serve(
    rqctx: RequestContext<ApiContext>,
    method: Method,
    path: Path<AnyPath>,
    body: &[u8],
) -> Result<Response<Body>, HttpError> {
    let request = ApiRequest {
        method,
        path: route_path(&path.into_inner().path),
        query: rqctx.request.uri().query().map(String::from),
        body,
    };
    dispatch(&rqctx.context().ledger, &rqctx.log, request).await
}

#[endpoint {
    method = GET,
    path = "/{path:.*}",
    unpublished = true,
}]
async fn api_get(
    rqctx: RequestContext<ApiContext>,
    path: Path<AnyPath>,
) -> Result<Response<Body>, HttpError> {
    serve(rqctx, Method::GET, path, &[]).await
}

#[endpoint {
    method = POST,
    path = "/{path:.*}",
    unpublished = true,
}]
async fn api_post(
    rqctx: RequestContext<ApiContext>,
    path: Path<AnyPath>,
    body: UntypedBody,
) -> Result<Response<Body>, HttpError> {
    serve(rqctx, Method::POST, path, body.as_bytes()).await
}

#[endpoint {
    method = PUT,
    path = "/{path:.*}",
    unpublished = true,
}]
async fn api_put(
    rqctx: RequestContext<ApiContext>,
    path: Path<AnyPath>,
) -> Result<Response<Body>, HttpError> {
    serve(rqctx, Method::PUT, path, &[]).await
}

#[endpoint {
    method = PATCH,
    path = "/{path:.*}",
    unpublished = true,
}]
async fn api_patch(
    rqctx: RequestContext<ApiContext>,
    path: Path<AnyPath>,
) -> Result<Response<Body>, HttpError> {
    serve(rqctx, Method::PATCH, path, &[]).await
}

#[endpoint {
    method = DELETE,
    path = "/{path:.*}",
    unpublished = true,
}]
async fn api_delete(
    rqctx: RequestContext<ApiContext>,
    path: Path<AnyPath>,
) -> Result<Response<Body>, HttpError> {
    serve(rqctx, Method::DELETE, path, &[]).await
}

/// CORS preflight.  Answered without touching the store.
#[endpoint {
    method = OPTIONS,
    path = "/{path:.*}",
    unpublished = true,
}]
async fn api_options(
    _rqctx: RequestContext<ApiContext>,
    _path: Path<AnyPath>,
) -> Result<Response<Body>, HttpError> {
    preflight_response().map_err(|error| ErrorWrap(error).into())
}

/// Request as seen by the dispatcher.
pub struct ApiRequest<'a> {
    pub method: Method,
    /// Path with any deployment prefix removed, e.g. `click`.
    pub path: String,
    /// Raw query string, parsed only by the routes that take parameters.
    pub query: Option<String>,
    pub body: &'a [u8],
}

/// Joins the path segments and drops the `api/` or
/// `.netlify/functions/api/` prefix the frontend may send.
pub fn route_path(segments: &[String]) -> String {
    let joined = segments.join("/");
    for prefix in [".netlify/functions/api/", "api/"] {
        if let Some(rest) = joined.strip_prefix(prefix) {
            return rest.to_owned();
        }
    }
    joined
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Health,
    Test,
    Reset,
    Countries,
    Leaderboard,
    Click,
    CountryCode,
}

impl Route {
    fn resolve(method: &Method, path: &str) -> Option<Route> {
        let route = match (method, path) {
            (_, "health") => Route::Health,
            (&Method::GET, "test") | (&Method::POST, "test") => Route::Test,
            (&Method::POST, "reset") => Route::Reset,
            (&Method::GET, "countries") => Route::Countries,
            (&Method::GET, "leaderboard") => Route::Leaderboard,
            (&Method::POST, "click") => Route::Click,
            (&Method::GET, "country-code") => Route::CountryCode,
            _ => return None,
        };
        Some(route)
    }

    fn needs_store(self) -> bool {
        !matches!(self, Route::Health | Route::Test | Route::CountryCode)
    }
}

#[derive(Deserialize)]
struct ClickRequest {
    country: Option<String>,
    country_code: Option<String>,
}

impl ClickRequest {
    fn parse(body: &[u8]) -> Result<ClickRequest, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ClickRequest { country: None, country_code: None });
        }
        serde_json::from_slice(body).map_err(|error| {
            ApiError::validation(format!("Invalid JSON body: {}", error))
        })
    }
}

#[derive(Serialize)]
struct HealthReply {
    status: &'static str,
    timestamp: String,
    message: &'static str,
}

#[derive(Serialize)]
struct TestReply<'a> {
    success: bool,
    message: &'static str,
    path: &'a str,
}

#[derive(Serialize)]
struct MessageReply {
    success: bool,
    message: &'static str,
}

#[derive(Serialize)]
struct CountriesReply {
    success: bool,
    countries: Vec<CountryTotal>,
    total: usize,
}

#[derive(Serialize)]
struct LeaderboardReply {
    success: bool,
    leaderboard: Vec<CountryTally>,
}

#[derive(Serialize)]
struct ClickReply {
    success: bool,
    leaderboard: Vec<CountryTally>,
    #[serde(rename = "newCount")]
    new_count: i64,
}

#[derive(Serialize)]
struct CountryCodeReply {
    success: bool,
    country: String,
    country_code: String,
}

#[derive(Serialize)]
struct FailureReply {
    success: bool,
    error: String,
}

#[derive(Serialize)]
struct NotFoundReply<'a> {
    error: String,
    path: &'a str,
    method: &'a str,
}

/// Resolves the route, runs it and renders the JSON reply.  Failures are
/// rendered too; an `Err` is only returned when even that is impossible.
pub async fn dispatch(
    ledger: &Ledger,
    log: &slog::Logger,
    request: ApiRequest<'_>,
) -> Result<Response<Body>, HttpError> {
    debug!(log, "dispatching"; "method" => %request.method, "path" => &request.path);
    match respond(ledger, log, &request).await {
        Ok(response) => Ok(response),
        Err(error) => error_response(log, error)
            .map_err(|error| ErrorWrap(error).into()),
    }
}

async fn respond(
    ledger: &Ledger,
    log: &slog::Logger,
    request: &ApiRequest<'_>,
) -> Result<Response<Body>, ApiError> {
    let route = Route::resolve(&request.method, &request.path).ok_or_else(
        || ApiError::NotFound {
            path: request.path.clone(),
            method: request.method.to_string(),
        },
    )?;

    if route.needs_store() {
        ledger.ensure_schema().await?;
    }

    match route {
        Route::Health => reply(&HealthReply {
            status: "OK",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message: "PopCat API is running",
        }),
        Route::Test => reply(&TestReply {
            success: true,
            message: "API test endpoint working",
            path: &request.path,
        }),
        Route::Reset => {
            let removed = ledger.reset_all().await?;
            info!(log, "reset all tallies"; "rows_removed" => removed);
            reply(&MessageReply {
                success: true,
                message: "Database reset successfully - All data cleared",
            })
        }
        Route::Countries => {
            let countries = ledger.list_countries().await?;
            reply(&CountriesReply {
                success: true,
                total: countries.len(),
                countries,
            })
        }
        Route::Leaderboard => {
            let leaderboard = ledger.leaderboard().await?;
            reply(&LeaderboardReply { success: true, leaderboard })
        }
        Route::Click => {
            let click = ClickRequest::parse(request.body)?;
            let outcome = ledger
                .record_click(
                    click.country.as_deref(),
                    click.country_code.as_deref(),
                )
                .await?;
            debug!(log, "recorded click";
                "country" => click.country.as_deref(),
                "new_count" => outcome.new_count);
            reply(&ClickReply {
                success: true,
                leaderboard: outcome.leaderboard,
                new_count: outcome.new_count,
            })
        }
        Route::CountryCode => {
            let query = LookupQuery::parse(request.query.as_deref())?;
            reply(&CountryCodeReply {
                success: true,
                country: query.country.clone().unwrap_or_default(),
                country_code: country_code(
                    query.country.as_deref(),
                    query.code.as_deref(),
                ),
            })
        }
    }
}

fn reply<T: Serialize>(payload: &T) -> Result<Response<Body>, ApiError> {
    json_response(StatusCode::OK, payload).map_err(ApiError::Internal)
}

fn error_response(
    log: &slog::Logger,
    error: ApiError,
) -> anyhow::Result<Response<Body>> {
    let status = error.status_code();
    if status.is_server_error() {
        error!(log, "request failed"; "error_message" => %error);
    } else {
        debug!(log, "request rejected"; "error_message" => %error);
    }

    match &error {
        ApiError::NotFound { path, method } => json_response(
            status,
            &NotFoundReply { error: error.client_message(), path, method },
        ),
        _ => json_response(
            status,
            &FailureReply { success: false, error: error.client_message() },
        ),
    }
}

fn cors_headers(builder: http::response::Builder) -> http::response::Builder {
    builder
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Accept")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
        .header(header::CONTENT_TYPE, "application/json")
}

fn json_response<T: Serialize>(
    status: StatusCode,
    payload: &T,
) -> anyhow::Result<Response<Body>> {
    let body = serde_json::to_vec(payload).context("serializing response")?;
    cors_headers(Response::builder().status(status))
        .body(Body::from(body))
        .context("building response")
}

fn preflight_response() -> anyhow::Result<Response<Body>> {
    cors_headers(Response::builder().status(StatusCode::OK))
        .body(Body::empty())
        .context("building preflight response")
}
