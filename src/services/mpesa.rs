use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    config::Config,
    error::FieldError,
    services::payments::check_amount_and_phone,
};

/// Client for the mobile-money gateway (OAuth token, STK push, STK query).
/// Independent of the payments table.
pub struct MpesaClient {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    callback_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct StkPushRequest {
    pub phone: String,
    pub amount: Decimal,
    pub account_reference: Option<String>,
    pub description: Option<String>,
}

impl StkPushRequest {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_amount_and_phone(self.amount, &self.phone, &mut errors);
        errors
    }
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self { result_code: 0, result_desc: "Accepted" }
    }
}

/// `0712…` and `712…` become `254712…`; a leading `+` is dropped.
pub fn normalize_msisdn(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Some(rest) = digits.strip_prefix('0') {
        format!("254{rest}")
    } else if digits.len() == 9 {
        format!("254{digits}")
    } else {
        digits
    }
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// base64(shortcode + passkey + timestamp)
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

impl MpesaClient {
    /// `None` unless every gateway setting is present.
    pub fn new(config: &Config) -> Option<Self> {
        Some(Self {
            client: Client::new(),
            base_url: config.mpesa_base_url.trim_end_matches('/').to_string(),
            consumer_key: config.mpesa_consumer_key.clone()?,
            consumer_secret: config.mpesa_consumer_secret.clone()?,
            shortcode: config.mpesa_shortcode.clone()?,
            passkey: config.mpesa_passkey.clone()?,
            callback_url: config.mpesa_callback_url.clone()?,
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let response = self
            .client
            .get(format!("{}/oauth/v1/generate", self.base_url))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("gateway token request failed {status}: {text}");
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn post(&self, path: &str, payload: &Value) -> anyhow::Result<Value> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.context("gateway returned a non-JSON body")?;
        if !status.is_success() {
            tracing::warn!("gateway error {}: {}", status, body);
            anyhow::bail!("gateway request to {path} failed with {status}");
        }
        Ok(body)
    }

    pub async fn stk_push(&self, req: &StkPushRequest) -> anyhow::Result<Value> {
        let ts = timestamp(Utc::now());
        let phone = normalize_msisdn(&req.phone);
        // The gateway only takes whole units.
        let amount = req.amount.ceil().to_u64().context("amount out of range")?;

        let payload = json!({
            "BusinessShortCode": self.shortcode,
            "Password": stk_password(&self.shortcode, &self.passkey, &ts),
            "Timestamp": ts,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount,
            "PartyA": phone,
            "PartyB": self.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.callback_url,
            "AccountReference": req.account_reference.as_deref().unwrap_or("FuneralHome"),
            "TransactionDesc": req.description.as_deref().unwrap_or("Funeral services payment"),
        });

        self.post("/mpesa/stkpush/v1/processrequest", &payload).await
    }

    pub async fn stk_query(&self, checkout_request_id: &str) -> anyhow::Result<Value> {
        let ts = timestamp(Utc::now());
        let payload = json!({
            "BusinessShortCode": self.shortcode,
            "Password": stk_password(&self.shortcode, &self.passkey, &ts),
            "Timestamp": ts,
            "CheckoutRequestID": checkout_request_id,
        });
        self.post("/mpesa/stkpushquery/v1/query", &payload).await
    }
}

/// Pulls `(CheckoutRequestID, ResultCode)` out of a callback body.
pub fn callback_summary(body: &Value) -> Option<(String, i64)> {
    let stk = body.get("Body")?.get("stkCallback")?;
    let checkout = stk.get("CheckoutRequestID")?.as_str()?.to_string();
    let code = stk.get("ResultCode")?.as_i64()?;
    Some((checkout, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn push(amount: Decimal, phone: &str) -> StkPushRequest {
        StkPushRequest { phone: phone.into(), amount, account_reference: None, description: None }
    }

    #[test]
    fn push_amount_must_be_positive() {
        let fields = |req: StkPushRequest| {
            req.validate().into_iter().map(|e| e.field).collect::<Vec<_>>()
        };
        assert_eq!(fields(push(Decimal::ZERO, "0712345678")), ["amount"]);
        assert_eq!(fields(push(Decimal::new(-50, 0), "0712345678")), ["amount"]);
        assert_eq!(fields(push(Decimal::new(-50, 0), "12")), ["amount", "phone"]);
        assert!(push(Decimal::new(1, 0), "0712345678").validate().is_empty());
    }

    #[test]
    fn msisdn_normalisation() {
        assert_eq!(normalize_msisdn("0712345678"), "254712345678");
        assert_eq!(normalize_msisdn("+254712345678"), "254712345678");
        assert_eq!(normalize_msisdn("712345678"), "254712345678");
    }

    #[test]
    fn password_is_base64_of_concatenation() {
        let ts = timestamp(Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 7).unwrap());
        assert_eq!(ts, "20260301090507");
        let pw = stk_password("174379", "key", &ts);
        let decoded = STANDARD.decode(pw).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "174379key20260301090507");
    }

    #[test]
    fn unconfigured_gateway_is_disabled() {
        let mut config = Config::for_tests("/tmp");
        assert!(MpesaClient::new(&config).is_none());

        config.mpesa_consumer_key = Some("k".into());
        config.mpesa_consumer_secret = Some("s".into());
        config.mpesa_shortcode = Some("174379".into());
        config.mpesa_passkey = Some("p".into());
        assert!(MpesaClient::new(&config).is_none());

        config.mpesa_callback_url = Some("https://example.test/cb".into());
        assert!(MpesaClient::new(&config).is_some());
    }

    #[test]
    fn callback_fields_are_extracted() {
        let body = json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        });
        assert_eq!(
            callback_summary(&body),
            Some(("ws_CO_191220191020363925".to_string(), 1032))
        );
        assert_eq!(callback_summary(&json!({})), None);
    }
}
