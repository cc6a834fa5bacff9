// payrecon/src/gateway/click.rs

use super::normalize;
use super::{
  CreatedSession, GatewayError, PaymentGateway, SessionRequest, SessionUpdate, SessionUpdateRequest, StatusReport,
};
use crate::config::GatewayConfig;
use crate::models::CustomerDetails;
use crate::money;
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

/// What one HTTP exchange with the session-update endpoint produced.
#[derive(Debug)]
struct Attempt {
  status: u16,
  location: Option<String>,
  body: String,
}

impl Attempt {
  fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

enum Interpretation {
  Usable(SessionUpdate),
  Reject(GatewayError),
  Pass,
}

type Interpreter = fn(&Attempt) -> Interpretation;

/// Tried in order against each response; the first non-`Pass` answer wins.
const RESPONSE_INTERPRETERS: &[Interpreter] = &[redirect_location, ok_with_location, json_payload];

fn redirect_location(attempt: &Attempt) -> Interpretation {
  match &attempt.location {
    Some(location) if (300..400).contains(&attempt.status) => Interpretation::Usable(SessionUpdate::Redirect {
      location: location.clone(),
      http_status: Some(attempt.status),
    }),
    _ => Interpretation::Pass,
  }
}

fn ok_with_location(attempt: &Attempt) -> Interpretation {
  match &attempt.location {
    Some(location) if attempt.is_success() => Interpretation::Usable(SessionUpdate::Redirect {
      location: location.clone(),
      http_status: None,
    }),
    _ => Interpretation::Pass,
  }
}

fn json_payload(attempt: &Attempt) -> Interpretation {
  if !attempt.is_success() {
    return Interpretation::Pass;
  }
  let raw = parse_body(&attempt.body);
  if let Some(message) = normalize::embedded_error(&raw) {
    return Interpretation::Reject(GatewayError::Rejected { message });
  }
  Interpretation::Usable(SessionUpdate::Payload {
    payment_url: normalize::payment_url(&raw),
    raw,
  })
}

fn interpret(attempt: &Attempt) -> Interpretation {
  for interpreter in RESPONSE_INTERPRETERS {
    match interpreter(attempt) {
      Interpretation::Pass => continue,
      decided => return decided,
    }
  }
  Interpretation::Reject(GatewayError::Status {
    status: attempt.status,
    body: attempt.body.clone(),
  })
}

/// Unparseable bodies read as an empty object.
fn parse_body(body: &str) -> Value {
  serde_json::from_str(body).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn customer_fields(body: &mut Map<String, Value>, customer: &CustomerDetails) {
  body.insert("customer_name".into(), json!(customer.name));
  body.insert("customer_phone".into(), json!(customer.phone));
  body.insert("customer_email".into(), json!(customer.email));
  body.insert("customer_address".into(), json!(customer.address));
  body.insert("customer_comment".into(), json!(customer.notes));
  body.insert("customer_civilid".into(), json!(""));
}

/// reqwest-backed client. Redirects are never followed: a `Location` header
/// is data for the caller, not an instruction for us.
#[derive(Debug, Clone)]
pub struct ClickGateway {
  http: Client,
  base: Url,
  config: GatewayConfig,
}

impl ClickGateway {
  pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
    let base = Url::parse(config.base_url.trim_end_matches('/'))
      .map_err(|e| GatewayError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
    if base.cannot_be_a_base() {
      return Err(GatewayError::InvalidBaseUrl(config.base_url.clone()));
    }
    let http = Client::builder()
      .timeout(config.timeout)
      .redirect(Policy::none())
      .build()?;
    Ok(Self { http, base, config })
  }

  fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| GatewayError::InvalidBaseUrl(self.config.base_url.clone()))?
      .pop_if_empty()
      .extend(["api", "developer", "gatedeveloper"])
      .extend(segments);
    Ok(url)
  }

  async fn post(&self, url: Url, body: &Value) -> Result<reqwest::Response, GatewayError> {
    Ok(
      self
        .http
        .post(url)
        .bearer_auth(&self.config.api_key)
        .json(body)
        .send()
        .await?,
    )
  }

  /// Non-2xx becomes `GatewayError::Status`; the body is parsed leniently.
  async fn post_expecting_json(&self, url: Url, body: &Value) -> Result<Value, GatewayError> {
    let resp = self.post(url, body).await?;
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
      return Err(GatewayError::Status {
        status: status.as_u16(),
        body: text,
      });
    }
    Ok(parse_body(&text))
  }

  async fn send_attempt(&self, url: Url, body: &Value) -> Result<Attempt, GatewayError> {
    let resp = self.post(url, body).await?;
    let status = resp.status().as_u16();
    let location = resp
      .headers()
      .get(LOCATION)
      .and_then(|v| v.to_str().ok())
      .filter(|v| !v.is_empty())
      .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    Ok(Attempt { status, location, body })
  }
}

#[async_trait]
impl PaymentGateway for ClickGateway {
  #[instrument(name = "ClickGateway::create_session", skip_all, fields(order_reference = request.order_reference))]
  async fn create_session(&self, request: &SessionRequest) -> Result<CreatedSession, GatewayError> {
    let mut body = Map::new();
    body.insert("order_id".into(), json!(request.order_reference));
    body.insert("order_amount".into(), money::to_wire(request.amount));
    customer_fields(&mut body, &request.customer);
    body.insert("lang".into(), json!(request.lang.as_str()));
    body.insert("return_url".into(), json!(request.return_url));

    let url = self.endpoint(&[self.config.developer_user.as_str()])?;
    let raw = self.post_expecting_json(url, &Value::Object(body)).await?;
    let (session_id, indicator_token) = normalize::created_session(&raw)
      .ok_or_else(|| GatewayError::Malformed("create-session response carried no session id or indicator".into()))?;
    debug!(%session_id, "Gateway session created.");
    Ok(CreatedSession {
      session_id,
      indicator_token,
      raw,
    })
  }

  /// Tries the language-qualified endpoint first, then the bare one, since
  /// some deployments 404 on the former.
  #[instrument(name = "ClickGateway::update_session", skip_all, fields(session_id = %request.session_id))]
  async fn update_session(&self, request: &SessionUpdateRequest) -> Result<SessionUpdate, GatewayError> {
    let mut body = Map::new();
    body.insert("session_id".into(), json!(request.session_id));
    body.insert("order_id".into(), json!(request.order_reference));
    body.insert("order_amount".into(), money::to_wire(request.amount));
    body.insert("return_url".into(), json!(request.return_url));
    customer_fields(&mut body, &request.customer);
    body.insert("lang".into(), json!(request.lang.as_str()));
    let body = Value::Object(body);

    let user = self.config.developer_user.as_str();
    let candidates = [
      self.endpoint(&["sessionupdate", user, request.lang.as_str()])?,
      self.endpoint(&["sessionupdate", user])?,
    ];
    let attempts = candidates.len();

    let mut last_error = None;
    for url in candidates {
      debug!(%url, "Calling session update endpoint.");
      let attempt = match self.send_attempt(url.clone(), &body).await {
        Ok(attempt) => attempt,
        Err(err) => {
          warn!(%url, error = %err, "Session update call failed.");
          last_error = Some(err);
          continue;
        }
      };
      match interpret(&attempt) {
        Interpretation::Usable(update) => return Ok(update),
        Interpretation::Reject(err) => {
          warn!(%url, status = attempt.status, error = %err, "Session update endpoint unusable; trying next.");
          last_error = Some(err);
        }
        Interpretation::Pass => {}
      }
    }

    Err(GatewayError::Exhausted {
      attempts,
      last: Box::new(last_error.unwrap_or_else(|| GatewayError::Malformed("no usable response".into()))),
    })
  }

  #[instrument(name = "ClickGateway::query_status", skip(self))]
  async fn query_status(&self, session_id: &str, order_reference: Option<i64>) -> Result<StatusReport, GatewayError> {
    let body = json!({ "session_id": session_id, "order_id": order_reference });
    let url = self.endpoint(&["paymentstatus", self.config.developer_user.as_str()])?;
    let raw = self.post_expecting_json(url, &body).await?;
    let report = normalize::status_report(raw);
    debug!(status = ?report.status, status_text = %report.status_text, "Gateway status fetched.");
    Ok(report)
  }
}
