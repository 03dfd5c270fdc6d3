//! The [`NodeRpc`] contract and its HTTP implementation.
//!
//! Every call is a single request/response round trip. Nothing here retries:
//! several of these calls are not idempotent (broadcasting in particular),
//! so retry policy belongs to callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use spendfrom_core::{Amount, OutPoint, TxOutput, UnspentOutput};
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::error::{ConfigError, RpcError};
use crate::types::{
    AddressValidation, DecodedTransaction, Prevout, SignedTransaction, WalletInfo, WireDecoded,
    WireUnspent,
};

/// Typed view of the wallet node's RPC surface.
///
/// Implemented by [`RpcClient`] for real nodes and by in-memory fakes in
/// tests.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// `listunspent(minconf, maxconf, [addresses])`.
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> Result<Vec<UnspentOutput>, RpcError>;

    /// `createrawtransaction([{txid, vout}], {address: amount}[, locktime])`.
    /// Returns the unsigned transaction hex.
    async fn create_raw_transaction(
        &self,
        inputs: &[OutPoint],
        outputs: &[TxOutput],
        locktime: u32,
    ) -> Result<String, RpcError>;

    /// Ask the node's wallet to sign `hex`.
    async fn sign_raw_transaction(
        &self,
        hex: &str,
        prevouts: &[Prevout],
    ) -> Result<SignedTransaction, RpcError>;

    /// `sendrawtransaction(hex)`. Returns the transaction id.
    async fn send_raw_transaction(&self, hex: &str) -> Result<String, RpcError>;

    /// `decoderawtransaction(hex)`.
    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction, RpcError>;

    /// `validateaddress(address)`.
    async fn validate_address(&self, address: &str) -> Result<AddressValidation, RpcError>;

    /// `getwalletinfo()`.
    async fn wallet_info(&self) -> Result<WalletInfo, RpcError>;

    /// `walletpassphrase(passphrase, timeout)`.
    async fn wallet_passphrase(&self, passphrase: &str, timeout_secs: u64) -> Result<(), RpcError>;
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorObject>,
}

/// JSON-RPC 1.0 client over HTTP with basic authentication.
pub struct RpcClient {
    http: reqwest::Client,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(config: RpcConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            http,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one call and deserialize its `result`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let result = self.call_raw(method, params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::malformed(method, e.to_string()))
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, url = %self.config.url, "rpc request");
        let started = Instant::now();

        let response = self
            .http
            .post(&self.config.url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(method, status = status.as_u16(), "rpc credentials rejected");
            return Err(RpcError::Authentication {
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(method, e))?;
        debug!(
            method,
            id,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rpc response"
        );

        // Error replies arrive with HTTP 500 or 404 but still carry a JSON
        // envelope, so parse before looking at the status.
        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(e) if status.is_success() => return Err(RpcError::malformed(method, e.to_string())),
            Err(_) => {
                return Err(RpcError::Http {
                    method: method.to_string(),
                    status: status.as_u16(),
                    body: text.chars().take(200).collect(),
                });
            }
        };

        if let Some(err) = envelope.error {
            return Err(RpcError::Node {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }
        Ok(envelope.result)
    }

    fn transport_error(&self, method: &str, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout {
                method: method.to_string(),
                timeout_ms: self.config.timeout.as_millis() as u64,
            }
        } else {
            RpcError::Connection {
                endpoint: self.config.url.clone(),
                reason: e.to_string(),
            }
        }
    }
}

fn amount_json(method: &str, amount: Amount) -> Result<Value, RpcError> {
    amount
        .to_json_number()
        .map(Value::Number)
        .map_err(|e| RpcError::malformed(method, e.to_string()))
}

#[async_trait]
impl NodeRpc for RpcClient {
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[String],
    ) -> Result<Vec<UnspentOutput>, RpcError> {
        const METHOD: &str = "listunspent";
        let entries: Vec<WireUnspent> = self
            .call(METHOD, json!([min_conf, max_conf, addresses]))
            .await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(u) = entry.into_unspent(METHOD)? {
                out.push(u);
            }
        }
        Ok(out)
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[OutPoint],
        outputs: &[TxOutput],
        locktime: u32,
    ) -> Result<String, RpcError> {
        const METHOD: &str = "createrawtransaction";
        let ins: Vec<Value> = inputs
            .iter()
            .map(|o| json!({ "txid": o.txid, "vout": o.vout }))
            .collect();
        let mut outs = Map::new();
        for o in outputs {
            outs.insert(o.address.clone(), amount_json(METHOD, o.amount)?);
        }
        // Older nodes reject a third parameter.
        let params = if locktime == 0 {
            json!([ins, outs])
        } else {
            json!([ins, outs, locktime])
        };
        self.call(METHOD, params).await
    }

    async fn sign_raw_transaction(
        &self,
        hex: &str,
        prevouts: &[Prevout],
    ) -> Result<SignedTransaction, RpcError> {
        let method = self.config.sign_method.rpc_name();
        let mut prevtxs = Vec::with_capacity(prevouts.len());
        for p in prevouts {
            prevtxs.push(json!({
                "txid": p.outpoint.txid,
                "vout": p.outpoint.vout,
                "scriptPubKey": p.script_pub_key,
                "amount": amount_json(method, p.amount)?,
            }));
        }
        let params = if prevtxs.is_empty() {
            json!([hex])
        } else {
            json!([hex, prevtxs])
        };
        self.call(method, params).await
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String, RpcError> {
        self.call("sendrawtransaction", json!([hex])).await
    }

    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction, RpcError> {
        const METHOD: &str = "decoderawtransaction";
        let wire: WireDecoded = self.call(METHOD, json!([hex])).await?;
        wire.into_decoded(METHOD)
    }

    async fn validate_address(&self, address: &str) -> Result<AddressValidation, RpcError> {
        self.call("validateaddress", json!([address])).await
    }

    async fn wallet_info(&self) -> Result<WalletInfo, RpcError> {
        self.call("getwalletinfo", json!([])).await
    }

    async fn wallet_passphrase(&self, passphrase: &str, timeout_secs: u64) -> Result<(), RpcError> {
        let _: Value = self
            .call("walletpassphrase", json!([passphrase, timeout_secs]))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::{Json, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;

    use crate::config::SignMethod;

    // "user:pass"
    const GOOD_AUTH: &str = "Basic dXNlcjpwYXNz";

    type Reply = Arc<dyn Fn(&Value) -> (AxumStatus, Value) + Send + Sync>;

    #[derive(Clone)]
    struct Stub {
        reply: Reply,
        seen: Arc<Mutex<Vec<Value>>>,
        delay: Duration,
    }

    async fn handle(State(stub): State<Stub>, headers: HeaderMap, Json(req): Json<Value>) -> Response {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some(GOOD_AUTH);
        if !authorized {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        if !stub.delay.is_zero() {
            tokio::time::sleep(stub.delay).await;
        }
        stub.seen.lock().unwrap().push(req.clone());
        let (status, body) = (stub.reply)(&req);
        (status, Json(body)).into_response()
    }

    async fn spawn_stub(stub: Stub) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", post(handle)).with_state(stub);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn stub<F>(reply: F) -> Stub
    where
        F: Fn(&Value) -> (AxumStatus, Value) + Send + Sync + 'static,
    {
        Stub {
            reply: Arc::new(reply),
            seen: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    fn ok(result: Value) -> (AxumStatus, Value) {
        (AxumStatus::OK, json!({ "result": result, "error": null, "id": 1 }))
    }

    fn client(url: String) -> RpcClient {
        RpcClient::new(RpcConfig::new(url, "user", "pass")).unwrap()
    }

    #[tokio::test]
    async fn list_unspent_sends_filter_and_parses_amounts() {
        let s = stub(|_| {
            ok(json!([
                {"txid": "aa", "vout": 0, "address": "mA", "amount": 0.05, "confirmations": 6, "spendable": true},
                {"txid": "bb", "vout": 2, "address": "mB", "amount": 0.03, "confirmations": 1}
            ]))
        });
        let seen = s.seen.clone();
        let c = client(spawn_stub(s).await);

        let utxos = c.list_unspent(1, 9_999_999, &["mA".to_string()]).await.unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].amount, Amount::from_units(5_000_000));
        assert_eq!(utxos[1].outpoint, OutPoint::new("bb", 2));

        let req = seen.lock().unwrap()[0].clone();
        assert_eq!(req["method"], "listunspent");
        assert_eq!(req["params"], json!([1, 9_999_999, ["mA"]]));
    }

    #[tokio::test]
    async fn create_raw_transaction_encodes_exact_amounts() {
        let s = stub(|_| ok(json!("0100abcd")));
        let seen = s.seen.clone();
        let c = client(spawn_stub(s).await);

        let hex = c
            .create_raw_transaction(
                &[OutPoint::new("aa", 1)],
                &[TxOutput {
                    address: "mX".into(),
                    amount: Amount::from_units(900_000),
                }],
                0,
            )
            .await
            .unwrap();
        assert_eq!(hex, "0100abcd");

        let req = seen.lock().unwrap()[0].clone();
        assert_eq!(req["params"][0], json!([{"txid": "aa", "vout": 1}]));
        assert_eq!(req["params"][1]["mX"].to_string(), "0.00900000");
        assert_eq!(req["params"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn node_error_is_surfaced_verbatim_even_with_http_500() {
        let s = stub(|_| {
            (
                AxumStatus::INTERNAL_SERVER_ERROR,
                json!({"result": null, "error": {"code": -26, "message": "min relay fee not met"}, "id": 1}),
            )
        });
        let c = client(spawn_stub(s).await);
        let err = c.send_raw_transaction("00").await.unwrap_err();
        assert_eq!(
            err,
            RpcError::Node {
                method: "sendrawtransaction".into(),
                code: -26,
                message: "min relay fee not met".into(),
            }
        );
    }

    #[tokio::test]
    async fn bad_credentials_map_to_authentication() {
        let s = stub(|_| ok(json!([])));
        let url = spawn_stub(s).await;
        let c = RpcClient::new(RpcConfig::new(url, "user", "wrong")).unwrap();
        let err = c.wallet_info().await.unwrap_err();
        assert_eq!(err, RpcError::Authentication { status: 401 });
    }

    #[tokio::test]
    async fn closed_port_maps_to_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let c = client(format!("http://{addr}"));
        let err = c.wallet_info().await.unwrap_err();
        assert!(matches!(err, RpcError::Connection { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_node_maps_to_timeout() {
        let mut s = stub(|_| ok(json!("txid")));
        s.delay = Duration::from_secs(2);
        let url = spawn_stub(s).await;
        let c = RpcClient::new(
            RpcConfig::new(url, "user", "pass").with_timeout(Duration::from_millis(200)),
        )
        .unwrap();
        let err = c.send_raw_transaction("00").await.unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
    }

    #[tokio::test]
    async fn sign_uses_configured_method_and_prevtxs() {
        let s = stub(|_| ok(json!({"hex": "signed", "complete": true})));
        let seen = s.seen.clone();
        let url = spawn_stub(s).await;
        let c = RpcClient::new(
            RpcConfig::new(url, "user", "pass").with_sign_method(SignMethod::WithWallet),
        )
        .unwrap();

        let prevouts = vec![Prevout {
            outpoint: OutPoint::new("aa", 0),
            script_pub_key: "76a914".into(),
            amount: Amount::from_units(5_000_000),
        }];
        let signed = c.sign_raw_transaction("unsigned", &prevouts).await.unwrap();
        assert!(signed.complete);
        assert_eq!(signed.hex, "signed");

        let req = seen.lock().unwrap()[0].clone();
        assert_eq!(req["method"], "signrawtransactionwithwallet");
        assert_eq!(req["params"][1][0]["scriptPubKey"], "76a914");
        assert_eq!(req["params"][1][0]["amount"].to_string(), "0.05000000");
    }

    #[tokio::test]
    async fn malformed_result_is_reported() {
        let s = stub(|_| ok(json!({"unexpected": true})));
        let c = client(spawn_stub(s).await);
        let err = c.send_raw_transaction("00").await.unwrap_err();
        assert!(matches!(err, RpcError::Malformed { .. }));
    }

    #[tokio::test]
    async fn wallet_passphrase_accepts_null_result() {
        let s = stub(|_| ok(Value::Null));
        let seen = s.seen.clone();
        let c = client(spawn_stub(s).await);
        c.wallet_passphrase("pw", 5).await.unwrap();
        let req = seen.lock().unwrap()[0].clone();
        assert_eq!(req["params"], json!(["pw", 5]));
    }
}
