use crate::client::PolarClient;
use crate::config::PaginationConfig;
use crate::error::OperationError;
use crate::money;
use crate::pagination::{self, FetchRequest};
use crate::types::OptionEntry;
use reqwest::Method;
use serde_json::{Map, Value};

type Result<T = Value> = std::result::Result<T, OperationError>;

const DEFAULT_LIST_LIMIT: u64 = 50;

/// What every operation needs from the host session.
pub struct OperationContext<'a> {
    pub client: &'a PolarClient,
    pub pagination: &'a PaginationConfig,
    pub continue_on_fail: bool,
}

/// Run `operation` once per input item and flatten the results into
/// output records.
pub async fn execute(operation: &str, items: &[Value], ctx: &OperationContext<'_>) -> Result<Vec<Value>> {
    let mut out = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let empty = Map::new();
        let params = item.as_object().unwrap_or(&empty);

        match run_one(operation, params, ctx).await {
            Ok(Value::Array(records)) => out.extend(records),
            Ok(record) => out.push(record),
            Err(e) if ctx.continue_on_fail => {
                tracing::warn!(operation, index, error = %e, "item failed, continuing");
                out.push(serde_json::json!({
                    "error": e.to_string(),
                    "details": e.details(),
                }));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(out)
}

async fn run_one(operation: &str, params: &Map<String, Value>, ctx: &OperationContext<'_>) -> Result {
    match operation {
        "product.create" => product_create(params, ctx).await,
        "product.get" => {
            let id = required_str(params, "productId")?;
            Ok(ctx.client.get(&format!("/v1/products/{id}")).await?)
        }
        "product.getMany" => get_many("/v1/products", params, ctx).await,
        "product.update" => {
            let id = required_str(params, "productId")?;
            let fields = object_param(params, "updateFields");
            patch(ctx, &format!("/v1/products/{id}"), &fields).await
        }
        "product.archive" => {
            let id = required_str(params, "productId")?;
            Ok(ctx
                .client
                .request(Method::POST, &format!("/v1/products/{id}/archive"), None, None)
                .await?)
        }

        "checkout.create" => checkout_create(params, ctx).await,
        "checkout.get" => {
            let id = required_str(params, "checkoutId")?;
            Ok(ctx.client.get(&format!("/v1/checkouts/{id}")).await?)
        }
        "checkout.update" => {
            let id = required_str(params, "checkoutId")?;
            let mut fields = object_param(params, "updateFields");
            amount_to_cents(&mut fields);
            patch(ctx, &format!("/v1/checkouts/{id}"), &fields).await
        }

        "customer.create" => customer_create(params, ctx).await,
        "customer.get" => {
            let id = required_str(params, "customerId")?;
            Ok(ctx.client.get(&format!("/v1/customers/{id}")).await?)
        }
        "customer.getMany" => get_many("/v1/customers", params, ctx).await,
        "customer.update" => {
            let id = required_str(params, "customerId")?;
            let mut fields = object_param(params, "updateFields");
            unwrap_billing_address(&mut fields);
            patch(ctx, &format!("/v1/customers/{id}"), &fields).await
        }
        "customer.delete" => {
            let id = required_str(params, "customerId")?;
            ctx.client
                .request(Method::DELETE, &format!("/v1/customers/{id}"), None, None)
                .await?;
            Ok(serde_json::json!({ "success": true, "deleted_customer_id": id }))
        }

        "credentials.test" => {
            ctx.client.get("/v1/organizations").await?;
            Ok(serde_json::json!({ "success": true }))
        }

        other => Err(OperationError::UnknownOperation(other.to_string())),
    }
}

// ─── Shared request shapes ───────────────────────────────────────────────────

async fn patch(ctx: &OperationContext<'_>, endpoint: &str, fields: &Map<String, Value>) -> Result {
    Ok(ctx
        .client
        .request(Method::PATCH, endpoint, Some(fields), None)
        .await?)
}

async fn post(ctx: &OperationContext<'_>, endpoint: &str, body: &Map<String, Value>) -> Result {
    Ok(ctx
        .client
        .request(Method::POST, endpoint, Some(body), None)
        .await?)
}

/// `returnAll` walks every page; otherwise one call capped at `limit`.
async fn get_many(path: &str, params: &Map<String, Value>, ctx: &OperationContext<'_>) -> Result {
    let filters = object_param(params, "filters");
    let return_all = params
        .get("returnAll")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if return_all {
        let request = FetchRequest::new(path)
            .with_query(filters)
            .with_page_size(ctx.pagination.page_size);
        let items = pagination::fetch_all(&request, ctx.client, ctx.pagination.max_pages).await?;
        return Ok(Value::Array(items));
    }

    let limit = params
        .get("limit")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_LIST_LIMIT);
    let mut query = filters;
    query.insert("limit".to_string(), Value::from(limit));

    let response = ctx
        .client
        .request(Method::GET, path, None, Some(&query))
        .await?;
    Ok(match response {
        Value::Object(mut map) if map.get("items").is_some_and(|v| !v.is_null()) => {
            map.remove("items").unwrap_or(Value::Null)
        }
        other => other,
    })
}

// ─── Products ────────────────────────────────────────────────────────────────

async fn product_create(params: &Map<String, Value>, ctx: &OperationContext<'_>) -> Result {
    let name = required_str(params, "name")?;
    let additional = object_param(params, "additionalFields");

    let mut body = Map::new();
    body.insert("name".to_string(), Value::String(name.to_string()));
    body.extend(additional);

    let prices = body
        .get("prices")
        .and_then(|p| p.get("price"))
        .and_then(Value::as_array)
        .map(|prices| prices.iter().map(shape_price).collect::<Vec<_>>());
    if let Some(prices) = prices {
        body.insert("prices".to_string(), Value::Array(prices));
    }
    collect_metadata(&mut body);

    post(ctx, "/v1/products", &body).await
}

fn shape_price(price: &Value) -> Value {
    let mut shaped = Map::new();
    for key in ["type", "amount_type", "recurring_interval"] {
        if let Some(v) = price.get(key).filter(|v| !v.is_null()) {
            shaped.insert(key.to_string(), v.clone());
        }
    }
    if let Some(amount) = price
        .get("price_amount")
        .and_then(Value::as_f64)
        .filter(|a| *a != 0.0)
    {
        shaped.insert("price_amount".to_string(), Value::from(money::to_cents(amount)));
    }
    let currency = price
        .get("price_currency")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .unwrap_or("usd");
    shaped.insert("price_currency".to_string(), Value::String(currency.to_string()));
    Value::Object(shaped)
}

// ─── Checkouts ───────────────────────────────────────────────────────────────

async fn checkout_create(params: &Map<String, Value>, ctx: &OperationContext<'_>) -> Result {
    let product_id = required_str(params, "productId")?;
    let additional = object_param(params, "additionalFields");

    let mut body = Map::new();
    body.insert("product_id".to_string(), Value::String(product_id.to_string()));
    body.extend(additional);

    let extra_products = body
        .get("products")
        .and_then(Value::as_array)
        .filter(|p| !p.is_empty())
        .cloned();
    if let Some(extra) = extra_products {
        let mut ids = vec![Value::String(product_id.to_string())];
        ids.extend(extra);
        body.insert("product_ids".to_string(), Value::Array(ids));
        body.remove("products");
    }
    collect_metadata(&mut body);
    amount_to_cents(&mut body);

    post(ctx, "/v1/checkouts", &body).await
}

// ─── Customers ───────────────────────────────────────────────────────────────

async fn customer_create(params: &Map<String, Value>, ctx: &OperationContext<'_>) -> Result {
    let email = required_str(params, "email")?;
    let additional = object_param(params, "additionalFields");

    let mut body = Map::new();
    body.insert("email".to_string(), Value::String(email.to_string()));
    body.extend(additional);

    unwrap_billing_address(&mut body);
    collect_metadata(&mut body);

    post(ctx, "/v1/customers", &body).await
}

// ─── Field shaping ───────────────────────────────────────────────────────────

fn required_str<'a>(params: &'a Map<String, Value>, key: &'static str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(OperationError::MissingParameter(key))
}

fn object_param(params: &Map<String, Value>, key: &str) -> Map<String, Value> {
    params
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// `{"metadata": {"metadata": [{key, value}, ..]}}` becomes a flat object.
fn collect_metadata(body: &mut Map<String, Value>) {
    let pairs = body
        .get("metadata")
        .and_then(|m| m.get("metadata"))
        .and_then(Value::as_array)
        .cloned();
    if let Some(pairs) = pairs {
        let mut metadata = Map::new();
        for pair in pairs {
            if let Some(key) = pair.get("key").and_then(Value::as_str) {
                let value = pair.get("value").cloned().unwrap_or(Value::Null);
                metadata.insert(key.to_string(), value);
            }
        }
        body.insert("metadata".to_string(), Value::Object(metadata));
    }
}

fn unwrap_billing_address(body: &mut Map<String, Value>) {
    let address = body
        .get("billing_address")
        .and_then(|b| b.get("address"))
        .cloned();
    if let Some(address) = address {
        body.insert("billing_address".to_string(), address);
    }
}

fn amount_to_cents(body: &mut Map<String, Value>) {
    let amount = body
        .get("amount")
        .and_then(Value::as_f64)
        .filter(|a| *a != 0.0);
    if let Some(amount) = amount {
        body.insert("amount".to_string(), Value::from(money::to_cents(amount)));
    }
}

// ─── Dropdown loaders ────────────────────────────────────────────────────────

/// Populate a dropdown. API failures yield an empty list.
pub async fn load_options(method: &str, params: &Map<String, Value>, ctx: &OperationContext<'_>) -> Vec<OptionEntry> {
    let result = match method {
        "getProducts" => load_products(ctx).await,
        "getProductPrices" => match params.get("productId").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => load_product_prices(id, ctx).await,
            _ => Ok(Vec::new()),
        },
        other => Err(OperationError::UnknownOperation(other.to_string())),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(method, error = %e, "load_options failed");
        Vec::new()
    })
}

async fn load_products(ctx: &OperationContext<'_>) -> Result<Vec<OptionEntry>> {
    let request = FetchRequest::new("/v1/products").with_page_size(100);
    let products = pagination::fetch_all(&request, ctx.client, ctx.pagination.max_pages).await?;

    Ok(products
        .iter()
        .map(|p| {
            let id = p.get("id").and_then(Value::as_str).unwrap_or_default();
            let description = p.get("description").and_then(Value::as_str).unwrap_or("");
            OptionEntry {
                name: p.get("name").and_then(Value::as_str).unwrap_or(id).to_string(),
                value: id.to_string(),
                description: format!("{description} - ID: {id}"),
            }
        })
        .collect())
}

async fn load_product_prices(product_id: &str, ctx: &OperationContext<'_>) -> Result<Vec<OptionEntry>> {
    let product = ctx.client.get(&format!("/v1/products/{product_id}")).await?;
    let prices = match product.get("prices").and_then(Value::as_array) {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };

    Ok(prices.iter().map(price_option).collect())
}

fn price_option(price: &Value) -> OptionEntry {
    let amount = if price.get("amount_type").and_then(Value::as_str) == Some("fixed") {
        let cents = price.get("price_amount").and_then(Value::as_i64).unwrap_or(0);
        let currency = price.get("price_currency").and_then(Value::as_str).unwrap_or("usd");
        money::plain_amount(cents, currency)
    } else {
        "Custom amount".to_string()
    };
    let kind = price.get("type").and_then(Value::as_str).unwrap_or("");
    let description = match price.get("recurring_interval").and_then(Value::as_str) {
        Some(interval) if !interval.is_empty() => format!("Recurring {interval}"),
        _ => "One-time".to_string(),
    };

    OptionEntry {
        name: format!("{amount} - {kind}"),
        value: price
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PolarClient {
        let credentials: Credentials = serde_json::from_value(json!({
            "access_token": "polar_oat_test",
            "base_url": server.uri(),
        }))
        .unwrap();
        PolarClient::new(&credentials).unwrap()
    }

    fn ctx<'a>(client: &'a PolarClient, pagination: &'a PaginationConfig, continue_on_fail: bool) -> OperationContext<'a> {
        OperationContext {
            client,
            pagination,
            continue_on_fail,
        }
    }

    #[test]
    fn metadata_pairs_become_object() {
        let mut body = json!({
            "metadata": { "metadata": [ { "key": "plan", "value": "pro" }, { "key": "seats", "value": "5" } ] }
        })
        .as_object()
        .cloned()
        .unwrap();
        collect_metadata(&mut body);
        assert_eq!(body["metadata"], json!({ "plan": "pro", "seats": "5" }));
    }

    #[test]
    fn price_shaping_converts_amount_and_defaults_currency() {
        let shaped = shape_price(&json!({
            "type": "recurring",
            "amount_type": "fixed",
            "price_amount": 9.99,
            "recurring_interval": "month"
        }));
        assert_eq!(
            shaped,
            json!({
                "type": "recurring",
                "amount_type": "fixed",
                "price_amount": 999,
                "price_currency": "usd",
                "recurring_interval": "month"
            })
        );
    }

    #[test]
    fn price_option_labels() {
        let fixed = price_option(&json!({
            "id": "price_1", "type": "recurring", "amount_type": "fixed",
            "price_amount": 1500, "price_currency": "usd", "recurring_interval": "month"
        }));
        assert_eq!(fixed.name, "15.00 USD - recurring");
        assert_eq!(fixed.value, "price_1");
        assert_eq!(fixed.description, "Recurring month");

        let custom = price_option(&json!({ "id": "price_2", "type": "one_time", "amount_type": "custom" }));
        assert_eq!(custom.name, "Custom amount - one_time");
        assert_eq!(custom.description, "One-time");
    }

    #[tokio::test]
    async fn checkout_create_shapes_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkouts"))
            .and(body_json(json!({
                "product_id": "prod_1",
                "product_ids": ["prod_1", "prod_2"],
                "amount": 1250,
                "customer_email": "a@b.c",
                "metadata": { "source": "workflow" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "co_1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![json!({
            "productId": "prod_1",
            "additionalFields": {
                "products": ["prod_2"],
                "amount": 12.5,
                "customer_email": "a@b.c",
                "metadata": { "metadata": [ { "key": "source", "value": "workflow" } ] }
            }
        })];

        let out = execute("checkout.create", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out, vec![json!({ "id": "co_1" })]);
    }

    #[tokio::test]
    async fn product_create_sends_prices_in_cents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/products"))
            .and(body_json(json!({
                "name": "Pro",
                "description": "Pro plan",
                "prices": [
                    {
                        "type": "recurring",
                        "amount_type": "fixed",
                        "recurring_interval": "month",
                        "price_amount": 1999,
                        "price_currency": "usd"
                    },
                    {
                        "type": "one_time",
                        "amount_type": "custom",
                        "price_currency": "eur"
                    }
                ]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "prod_1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![json!({
            "name": "Pro",
            "additionalFields": {
                "description": "Pro plan",
                "prices": { "price": [
                    { "type": "recurring", "amount_type": "fixed", "price_amount": 19.99, "recurring_interval": "month" },
                    { "type": "one_time", "amount_type": "custom", "price_currency": "eur" }
                ] }
            }
        })];

        let out = execute("product.create", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out, vec![json!({ "id": "prod_1" })]);
    }

    #[tokio::test]
    async fn product_archive_posts_to_archive_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/products/prod_1/archive"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "prod_1", "is_archived": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let out = execute(
            "product.archive",
            &[json!({ "productId": "prod_1" })],
            &ctx(&client, &pagination, false),
        )
        .await
        .unwrap();
        assert_eq!(out[0]["is_archived"], true);
    }

    #[tokio::test]
    async fn checkout_update_converts_amount() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/checkouts/co_1"))
            .and(body_json(json!({ "amount": 2050, "customer_email": "a@b.c" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "co_1", "amount": 2050 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![json!({
            "checkoutId": "co_1",
            "updateFields": { "amount": 20.5, "customer_email": "a@b.c" }
        })];

        let out = execute("checkout.update", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out[0]["amount"], 2050);
    }

    #[tokio::test]
    async fn customer_create_unwraps_billing_address() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .and(body_json(json!({
                "email": "a@b.c",
                "name": "Ann",
                "billing_address": { "country": "US", "city": "New York" },
                "metadata": { "tier": "gold" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "cus_1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![json!({
            "email": "a@b.c",
            "additionalFields": {
                "name": "Ann",
                "billing_address": { "address": { "country": "US", "city": "New York" } },
                "metadata": { "metadata": [ { "key": "tier", "value": "gold" } ] }
            }
        })];

        let out = execute("customer.create", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out, vec![json!({ "id": "cus_1" })]);
    }

    #[tokio::test]
    async fn customer_update_unwraps_billing_address() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/customers/cus_1"))
            .and(body_json(json!({ "billing_address": { "country": "SE" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cus_1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![json!({
            "customerId": "cus_1",
            "updateFields": { "billing_address": { "address": { "country": "SE" } } }
        })];

        let out = execute("customer.update", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out[0]["id"], "cus_1");
    }

    #[tokio::test]
    async fn credentials_test_reads_organizations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/organizations"))
            .and(header("authorization", "Bearer polar_oat_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let out = execute("credentials.test", &[json!({})], &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out, vec![json!({ "success": true })]);
    }

    #[tokio::test]
    async fn get_many_return_all_paginates_and_flattens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .and(query_param("page", "1"))
            .and(query_param("email", "a@b.c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "cus_1" }],
                "pagination": { "next_page": 2 }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/customers"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "cus_2" }],
                "pagination": { "next_page": null }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![json!({ "returnAll": true, "filters": { "email": "a@b.c" } })];

        let out = execute("customer.getMany", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out, vec![json!({ "id": "cus_1" }), json!({ "id": "cus_2" })]);
    }

    #[tokio::test]
    async fn get_many_with_limit_makes_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "p1" }, { "id": "p2" }],
                "pagination": { "next_page": 2 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![json!({ "limit": 5 })];

        let out = execute("product.getMany", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn customer_delete_reports_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/customers/cus_9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let out = execute(
            "customer.delete",
            &[json!({ "customerId": "cus_9" })],
            &ctx(&client, &pagination, false),
        )
        .await
        .unwrap();
        assert_eq!(out, vec![json!({ "success": true, "deleted_customer_id": "cus_9" })]);
    }

    #[tokio::test]
    async fn continue_on_fail_records_error_and_keeps_going() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/products/bad"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"detail\":\"Not found\"}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/products/good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "good" })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let items = vec![
            json!({ "productId": "bad" }),
            json!({ "productId": "good" }),
            json!({}),
        ];

        let out = execute("product.get", &items, &ctx(&client, &pagination, true))
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0]["error"].as_str().unwrap().contains("404"));
        assert!(out[0]["details"].as_str().unwrap().contains("Not found"));
        assert_eq!(out[1]["id"], "good");
        assert_eq!(out[2]["error"], "missing required field: productId");

        let err = execute("product.get", &items, &ctx(&client, &pagination, false))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Api(_)));
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let err = execute("product.explode", &[json!({})], &ctx(&client, &pagination, false))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation(_)));
    }

    #[tokio::test]
    async fn load_options_swallows_api_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let options = load_options("getProducts", &Map::new(), &ctx(&client, &pagination, false)).await;
        assert!(options.is_empty());
    }

    #[tokio::test]
    async fn load_products_builds_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "prod_1", "name": "Pro", "description": "Pro plan" }],
                "pagination": { "next_page": null }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let pagination = PaginationConfig::default();
        let options = load_options("getProducts", &Map::new(), &ctx(&client, &pagination, false)).await;
        assert_eq!(
            options,
            vec![OptionEntry {
                name: "Pro".into(),
                value: "prod_1".into(),
                description: "Pro plan - ID: prod_1".into(),
            }]
        );
    }
}
