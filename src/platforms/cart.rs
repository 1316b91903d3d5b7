//! Account cart and checkout transaction endpoints.
//!
//! Each call is a single request; retry and repair policy lives in
//! `engine::checkout`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{pairs, RemoteClient, Session};

const CART_SERVICE: &str = "https://api.steampowered.com/IAccountCartService";
const CHECKOUT_URL: &str = "https://checkout.steampowered.com/checkout";
const CHECKOUT_REFERER: &str = "https://checkout.steampowered.com/checkout/?accountcart=1";

/// Billing country sent with the cart and the transaction skeleton.
pub const DEFAULT_COUNTRY: &str = "DE";

/// `finalizetransaction` status meaning the purchase went through.
pub const FINALIZE_SUCCESS: i64 = 22;

fn service_url(method: &str, session: &Session) -> String {
    format!(
        "{CART_SERVICE}/{method}/v1/?access_token={}",
        urlencoding::encode(session.access_token())
    )
}

/// JSON ids arrive as strings or numbers depending on the endpoint.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

pub async fn delete_cart(client: &dyn RemoteClient, session: &Session) -> bool {
    let ok = client
        .post(&service_url("DeleteCart", session), &[], &[])
        .await
        .is_some();
    if ok {
        debug!("Account cart cleared");
    } else {
        warn!("Failed to clear account cart");
    }
    ok
}

fn add_items_payload(package_id: u64) -> Value {
    json!({
        "user_country": DEFAULT_COUNTRY,
        "items": [{ "packageid": package_id }],
        "navdata": {
            "domain": "store.steampowered.com",
            "controller": "default",
            "method": "default",
            "submethod": "",
            "feature": "spotlight",
            "depth": 1,
            "countrycode": DEFAULT_COUNTRY,
            "webkey": 0,
            "is_client": false,
            "curator_data": { "clanid": null, "listid": null },
            "is_likely_bot": false,
            "is_utm": false,
        },
    })
}

#[derive(Debug, Deserialize)]
struct ServiceEnvelope {
    #[serde(default)]
    response: Value,
}

/// Add one package to the cart. Returns the new line item ids; an empty
/// list means the platform did not accept the package.
pub async fn add_to_cart(client: &dyn RemoteClient, session: &Session, package_id: u64) -> Vec<String> {
    let form = vec![("input_json".to_string(), add_items_payload(package_id).to_string())];
    let headers = pairs([("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")]);

    let Some(body) = client.post(&service_url("AddItemsToCart", session), &form, &headers).await else {
        return Vec::new();
    };

    serde_json::from_str::<ServiceEnvelope>(&body)
        .ok()
        .and_then(|env| env.response.get("line_item_ids").and_then(Value::as_array).cloned())
        .map(|ids| ids.iter().filter_map(id_string).collect())
        .unwrap_or_default()
}

/// One line of the account cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub line_item_id: String,
    pub package_id: Option<u64>,
}

pub async fn get_cart(client: &dyn RemoteClient, session: &Session) -> Option<Vec<CartLine>> {
    let body = client.get(&service_url("GetCart", session), &[]).await?;
    let env: ServiceEnvelope = match serde_json::from_str(&body) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "Cart response is not JSON");
            return None;
        }
    };

    let lines = env
        .response
        .pointer("/cart/line_items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|line| {
                    Some(CartLine {
                        line_item_id: id_string(line.get("line_item_id")?)?,
                        package_id: line.get("packageid").and_then(|v| {
                            v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                        }),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(lines)
}

pub async fn delete_line_item(client: &dyn RemoteClient, session: &Session, line_item_id: &str) -> bool {
    let form = vec![("line_item_id".to_string(), line_item_id.to_string())];
    client
        .post(&service_url("DeleteLineItem", session), &form, &[])
        .await
        .is_some()
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Outcome of one `inittransaction` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Started { transaction_id: String },
    /// A cart item blocks the transaction. Carries the platform's error text.
    ItemRejected { error_text: String },
    Failed,
}

fn init_form(session: &Session) -> Vec<(String, String)> {
    let mut form = pairs([
        ("gidShoppingCart", "-1"),
        ("gidReplayOfTransID", "-1"),
        ("bUseAccountCart", "1"),
        ("PaymentMethod", "steamaccount"),
        ("abortPendingTransactions", "0"),
        ("bHasCardInfo", "0"),
        ("CardNumber", ""),
        ("CardExpirationYear", ""),
        ("CardExpirationMonth", ""),
        ("FirstName", ""),
        ("LastName", ""),
        ("Address", ""),
        ("AddressTwo", ""),
        ("Country", DEFAULT_COUNTRY),
        ("City", ""),
        ("State", ""),
        ("PostalCode", ""),
        ("Phone", ""),
        ("ShippingFirstName", ""),
        ("ShippingLastName", ""),
        ("ShippingAddress", ""),
        ("ShippingAddressTwo", ""),
        ("ShippingCountry", DEFAULT_COUNTRY),
        ("ShippingCity", ""),
        ("ShippingState", ""),
        ("ShippingPostalCode", ""),
        ("ShippingPhone", ""),
        ("bIsGift", "0"),
        ("GifteeAccountID", "0"),
        ("GifteeEmail", ""),
        ("GifteeName", ""),
        ("GiftMessage", ""),
        ("Sentiment", ""),
        ("Signature", ""),
        ("ScheduledSendOnDate", "0"),
        ("BankAccount", ""),
        ("BankCode", ""),
        ("BankIBAN", ""),
        ("BankBIC", ""),
        ("TPBankID", ""),
        ("bSaveBillingAddress", "1"),
        ("gidPaymentID", ""),
        ("bUseRemainingSteamAccount", "1"),
        ("bPreAuthOnly", "0"),
    ]);
    form.push(("sessionid".to_string(), session.session_id.clone()));
    form
}

/// Interpret an `inittransaction` body.
pub fn parse_init_response(body: &str) -> InitOutcome {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return InitOutcome::Failed;
    };

    let caused_error = value
        .get("appcausingerror")
        .is_some_and(|v| !v.is_null() && v.as_i64() != Some(0) && v.as_bool() != Some(false));
    if caused_error {
        let error_text = value
            .get("specificerrortext")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return InitOutcome::ItemRejected { error_text };
    }

    let success = value.get("success").and_then(Value::as_i64) == Some(1);
    match value.get("transid").and_then(id_string) {
        Some(transaction_id) if success => InitOutcome::Started { transaction_id },
        _ => InitOutcome::Failed,
    }
}

/// A checkout call's interpreted result alongside the raw body, kept for
/// the debug sink. `body` is `None` when nothing came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReply<T> {
    pub outcome: T,
    pub body: Option<String>,
}

pub async fn init_transaction(client: &dyn RemoteClient, session: &Session) -> CheckoutReply<InitOutcome> {
    let headers = vec![("Cookie".to_string(), session.cookie_header())];
    let body = client
        .post(&format!("{CHECKOUT_URL}/inittransaction/"), &init_form(session), &headers)
        .await;
    let outcome = body.as_deref().map_or(InitOutcome::Failed, parse_init_response);
    CheckoutReply { outcome, body }
}

/// Formatted account total if the final-price query succeeded.
pub async fn final_price(client: &dyn RemoteClient, session: &Session, transaction_id: &str) -> Option<String> {
    let url = format!(
        "{CHECKOUT_URL}/getfinalprice/?count=1&transid={}&purchasetype=self&microtxnid=-1&cart=-1&gidReplayOfTransID=-1",
        urlencoding::encode(transaction_id)
    );
    let headers = vec![
        ("Cookie".to_string(), session.checkout_cookie_header()),
        ("Referer".to_string(), CHECKOUT_REFERER.to_string()),
    ];

    let body = client.get(&url, &headers).await?;
    let value: Value = serde_json::from_str(&body).ok()?;
    if value.get("error").is_some_and(|e| !e.is_null()) {
        warn!(transaction_id, response = %value, "Final price query returned an error");
        return None;
    }

    Some(
        value
            .get("formattedSteamAccountTotal")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    )
}

/// Submit payment for `transaction_id`. The outcome is the platform status
/// code, `None` when no parseable response came back.
pub async fn finalize_transaction(
    client: &dyn RemoteClient,
    session: &Session,
    transaction_id: &str,
) -> CheckoutReply<Option<i64>> {
    let browser_info = json!({
        "language": "de-DE",
        "javaEnabled": false,
        "colorDepth": 24,
        "screenHeight": 1080,
        "screenWidth": 1920,
    });
    let form = vec![
        ("transid".to_string(), transaction_id.to_string()),
        ("CardCVV2".to_string(), String::new()),
        ("browserInfo".to_string(), browser_info.to_string()),
    ];
    let headers = vec![
        ("Cookie".to_string(), session.cookie_header()),
        ("Origin".to_string(), "https://checkout.steampowered.com".to_string()),
        ("Referer".to_string(), CHECKOUT_REFERER.to_string()),
    ];

    let body = client
        .post(&format!("{CHECKOUT_URL}/finalizetransaction/"), &form, &headers)
        .await;
    let outcome = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| v.get("success").and_then(Value::as_i64));
    CheckoutReply { outcome, body }
}
