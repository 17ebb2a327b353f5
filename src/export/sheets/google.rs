//! Google Sheets v4 REST client authenticated with a service account key.

use super::store::{
    CellRange, CellValue, Dimension, NumberFormat, SheetStore, SpreadsheetInfo, WorksheetInfo,
};
use crate::error::ExportError;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use wreq::{Client, RequestBuilder};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str =
    "https://www.googleapis.com/auth/drive.file https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// The fields of a service account JSON key that token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, ExportError> {
        let content = fs::read_to_string(path).map_err(|e| ExportError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            ExportError::Auth(format!("invalid service account key {}: {}", path.display(), e))
        })
    }

    /// Signed RS256 assertion valid for one hour from `now` (unix seconds).
    pub fn assertion(&self, now: i64) -> Result<String, ExportError> {
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| ExportError::Auth(format!("invalid private key: {}", e)))?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| ExportError::Auth(format!("cannot sign token request: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

impl From<SheetProperties> for WorksheetInfo {
    fn from(p: SheetProperties) -> Self {
        WorksheetInfo {
            id: p.sheet_id,
            title: p.title,
            row_count: p.grid_properties.row_count,
            col_count: p.grid_properties.column_count,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

/// Client bound to one spreadsheet, holding a bearer token for its session.
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
}

impl GoogleSheetsClient {
    /// Reads the key file, exchanges it for an access token and binds to `spreadsheet_id`.
    pub async fn connect(key_file: &Path, spreadsheet_id: &str) -> Result<Self, ExportError> {
        let key = ServiceAccountKey::from_file(key_file)?;
        Self::connect_with_base_url(&key, spreadsheet_id, SHEETS_API_BASE.to_string()).await
    }

    /// Like [`connect`](Self::connect) against a custom Sheets endpoint (for testing).
    pub async fn connect_with_base_url(
        key: &ServiceAccountKey,
        spreadsheet_id: &str,
        base_url: String,
    ) -> Result<Self, ExportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExportError::remote("building HTTP client", e))?;

        let access_token = fetch_access_token(&client, key).await?;
        debug!("Authenticated as {}", key.client_email);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token,
        })
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/{}", self.base_url, self.spreadsheet_id)
    }

    fn values_url(&self, range: &str, query: &str) -> String {
        format!("{}/values/{}?{}", self.spreadsheet_url(), urlencoding::encode(range), query)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, ExportError> {
        let response = request
            .header("authorization", format!("Bearer {}", self.access_token))
            .send()
            .await
            .map_err(|e| ExportError::remote(operation, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ExportError::remote(operation, e))?;
        if !status.is_success() {
            return Err(ExportError::remote(operation, format!("status {}: {}", status, body)));
        }

        serde_json::from_str(&body).map_err(|e| ExportError::invalid_response(operation, e))
    }

    fn with_json(request: RequestBuilder, body: &Value) -> RequestBuilder {
        request.header("content-type", "application/json").body(body.to_string())
    }

    async fn batch_update(&self, operation: &str, request: Value) -> Result<Vec<Value>, ExportError> {
        let url = format!("{}:batchUpdate", self.spreadsheet_url());
        debug!("POST {} ({})", url, operation);

        let body = json!({ "requests": [request] });
        let response: BatchUpdateResponse =
            self.send(operation, Self::with_json(self.client.post(url.as_str()), &body)).await?;
        Ok(response.replies)
    }

    async fn values(
        &self,
        operation: &str,
        range: &str,
        major_dimension: &str,
    ) -> Result<Vec<String>, ExportError> {
        let url = self.values_url(range, &format!("majorDimension={}", major_dimension));
        debug!("GET {}", url);

        let response: ValueRange = self.send(operation, self.client.get(url.as_str())).await?;
        Ok(response.values.into_iter().next().unwrap_or_default().iter().map(cell_text).collect())
    }
}

async fn fetch_access_token(client: &Client, key: &ServiceAccountKey) -> Result<String, ExportError> {
    let assertion = key.assertion(Utc::now().timestamp())?;
    let form = format!(
        "grant_type={}&assertion={}",
        urlencoding::encode(JWT_GRANT_TYPE),
        urlencoding::encode(&assertion)
    );

    debug!("POST {}", key.token_uri);
    let response = client
        .post(key.token_uri.as_str())
        .header("content-type", "application/x-www-form-urlencoded")
        .body(form)
        .send()
        .await
        .map_err(|e| ExportError::Auth(format!("token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ExportError::Auth(format!("token response unreadable: {}", e)))?;
    if !status.is_success() {
        return Err(ExportError::Auth(format!("token endpoint returned {}: {}", status, body)));
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| ExportError::Auth(format!("invalid token response: {}", e)))?;
    Ok(token.access_token)
}

/// Worksheet title quoted for use in an A1 range.
fn quoted_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell_json(value: &CellValue) -> Value {
    match value {
        CellValue::Text(text) => json!(text),
        CellValue::Number(n) => json!(n),
        CellValue::Blank => json!(""),
    }
}

fn grid_range(sheet_id: i64, range: &CellRange) -> Value {
    json!({
        "sheetId": sheet_id,
        "startRowIndex": range.start_row - 1,
        "endRowIndex": range.end_row,
        "startColumnIndex": range.start_col - 1,
        "endColumnIndex": range.end_col,
    })
}

#[async_trait]
impl SheetStore for GoogleSheetsClient {
    async fn spreadsheet(&self) -> Result<SpreadsheetInfo, ExportError> {
        let url = format!("{}?fields=properties.title,sheets.properties", self.spreadsheet_url());
        debug!("GET {}", url);

        let operation = format!("Loading spreadsheet {}", self.spreadsheet_id);
        let response: SpreadsheetResponse = self.send(&operation, self.client.get(url.as_str())).await?;

        Ok(SpreadsheetInfo {
            title: response.properties.title,
            worksheets: response.sheets.into_iter().map(|s| s.properties.into()).collect(),
        })
    }

    async fn add_worksheet(
        &self,
        title: &str,
        rows: usize,
        cols: usize,
    ) -> Result<WorksheetInfo, ExportError> {
        let operation = format!("Adding worksheet '{}'", title);
        let request = json!({
            "addSheet": {
                "properties": {
                    "title": title,
                    "gridProperties": { "rowCount": rows, "columnCount": cols },
                }
            }
        });

        let replies = self.batch_update(&operation, request).await?;
        let properties = replies
            .into_iter()
            .next()
            .and_then(|mut reply| reply.get_mut("addSheet")?.get_mut("properties").map(Value::take))
            .ok_or_else(|| ExportError::invalid_response(&operation, "missing addSheet reply"))?;

        let properties: SheetProperties = serde_json::from_value(properties)
            .map_err(|e| ExportError::invalid_response(&operation, e))?;
        Ok(properties.into())
    }

    async fn row_values(
        &self,
        sheet: &WorksheetInfo,
        row: usize,
    ) -> Result<Vec<String>, ExportError> {
        let range = format!("{}!{}:{}", quoted_title(&sheet.title), row, row);
        self.values(&format!("Reading row {} of '{}'", row, sheet.title), &range, "ROWS").await
    }

    async fn col_values(
        &self,
        sheet: &WorksheetInfo,
        col: usize,
    ) -> Result<Vec<String>, ExportError> {
        let letters = super::store::column_letters(col);
        let range = format!("{}!{}:{}", quoted_title(&sheet.title), letters, letters);
        self.values(&format!("Reading column {} of '{}'", letters, sheet.title), &range, "COLUMNS")
            .await
    }

    async fn write_row(
        &self,
        sheet: &WorksheetInfo,
        row: usize,
        col: usize,
        values: &[CellValue],
    ) -> Result<(), ExportError> {
        if values.is_empty() {
            return Ok(());
        }

        let cells = CellRange::row_span(row, col, col + values.len() - 1);
        let range = format!("{}!{}", quoted_title(&sheet.title), cells.to_a1());
        let url = self.values_url(&range, "valueInputOption=USER_ENTERED");
        debug!("PUT {}", url);

        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [values.iter().map(cell_json).collect::<Vec<_>>()],
        });
        let operation = format!("Writing {}", range);
        let _: Value = self.send(&operation, Self::with_json(self.client.put(url.as_str()), &body)).await?;
        Ok(())
    }

    async fn append_dimension(
        &self,
        sheet: &WorksheetInfo,
        dimension: Dimension,
        length: usize,
    ) -> Result<(), ExportError> {
        let dimension = match dimension {
            Dimension::Rows => "ROWS",
            Dimension::Columns => "COLUMNS",
        };
        let operation = format!("Adding {} {} to '{}'", length, dimension, sheet.title);
        let request = json!({
            "appendDimension": { "sheetId": sheet.id, "dimension": dimension, "length": length }
        });

        self.batch_update(&operation, request).await.map(|_| ())
    }

    async fn format_range(
        &self,
        sheet: &WorksheetInfo,
        range: CellRange,
        format: NumberFormat,
    ) -> Result<(), ExportError> {
        let format_type = match format {
            NumberFormat::DateTime => "DATE_TIME",
            NumberFormat::Currency => "CURRENCY",
        };
        let operation = format!("Formatting {}!{}", sheet.title, range.to_a1());
        let request = json!({
            "repeatCell": {
                "range": grid_range(sheet.id, &range),
                "cell": { "userEnteredFormat": { "numberFormat": { "type": format_type } } },
                "fields": "userEnteredFormat.numberFormat",
            }
        });

        self.batch_update(&operation, request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_PRIVATE_KEY: &str = include_str!("../../../tests/fixtures/test_service_account.pem");

    fn make_test_key(token_uri: String) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "checker@test-project.iam.gserviceaccount.com".to_string(),
            private_key: TEST_PRIVATE_KEY.to_string(),
            token_uri,
        }
    }

    async fn connect(mock_server: &MockServer) -> GoogleSheetsClient {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "test-token", "expires_in": 3600 })),
            )
            .mount(mock_server)
            .await;

        let key = make_test_key(format!("{}/token", mock_server.uri()));
        GoogleSheetsClient::connect_with_base_url(
            &key,
            "sheet-123",
            format!("{}/v4/spreadsheets", mock_server.uri()),
        )
        .await
        .unwrap()
    }

    fn make_test_worksheet() -> WorksheetInfo {
        WorksheetInfo { id: 7, title: "GPUs".to_string(), row_count: 10000, col_count: 50 }
    }

    #[test]
    fn test_key_from_file_defaults_token_uri() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.json");
        let key_json = json!({
            "type": "service_account",
            "client_email": "a@b.iam.gserviceaccount.com",
            "private_key": TEST_PRIVATE_KEY,
        });
        fs::write(&key_path, key_json.to_string()).unwrap();

        let key = ServiceAccountKey::from_file(&key_path).unwrap();
        assert_eq!(key.client_email, "a@b.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_key_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.json");
        fs::write(&key_path, "not json").unwrap();

        let err = ServiceAccountKey::from_file(&key_path).unwrap_err();
        assert!(matches!(err, ExportError::Auth(_)));
    }

    #[test]
    fn test_assertion_claims() {
        let key = make_test_key("https://oauth2.example.com/token".to_string());
        let token = key.assertion(1_700_000_000).unwrap();

        #[derive(Deserialize)]
        struct Decoded {
            iss: String,
            scope: String,
            aud: String,
            iat: i64,
            exp: i64,
        }

        // Only the claims are checked here; the signature is verified by the token server
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.set_audience(&["https://oauth2.example.com/token"]);
        let decoded =
            decode::<Decoded>(&token, &DecodingKey::from_secret(b"unused"), &validation).unwrap();

        assert_eq!(decoded.header.alg, Algorithm::RS256);
        assert_eq!(decoded.claims.iss, "checker@test-project.iam.gserviceaccount.com");
        assert_eq!(decoded.claims.aud, "https://oauth2.example.com/token");
        assert!(decoded.claims.scope.contains("auth/spreadsheets"));
        assert_eq!(decoded.claims.exp - decoded.claims.iat, 3600);
    }

    #[test]
    fn test_assertion_rejects_bad_key() {
        let key = ServiceAccountKey {
            private_key: "garbage".to_string(),
            ..make_test_key(DEFAULT_TOKEN_URI.to_string())
        };
        assert!(matches!(key.assertion(0), Err(ExportError::Auth(_))));
    }

    #[tokio::test]
    async fn test_connect_token_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .mount(&mock_server)
            .await;

        let key = make_test_key(format!("{}/token", mock_server.uri()));
        let result =
            GoogleSheetsClient::connect_with_base_url(&key, "sheet-123", mock_server.uri()).await;

        match result {
            Err(ExportError::Auth(message)) => assert!(message.contains("invalid_grant")),
            _ => panic!("expected an authentication error"),
        }
    }

    #[tokio::test]
    async fn test_spreadsheet_metadata_with_bearer_token() {
        let mock_server = MockServer::start().await;
        let client = connect(&mock_server).await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": { "title": "Prices" },
                "sheets": [
                    { "properties": {
                        "sheetId": 0,
                        "title": "GPUs",
                        "gridProperties": { "rowCount": 10000, "columnCount": 50 }
                    } },
                    { "properties": { "sheetId": 42, "title": "CPUs" } }
                ]
            })))
            .mount(&mock_server)
            .await;

        let info = client.spreadsheet().await.unwrap();
        assert_eq!(info.title, "Prices");
        assert_eq!(info.worksheets.len(), 2);
        assert_eq!(
            info.worksheets[0],
            WorksheetInfo { id: 0, title: "GPUs".to_string(), row_count: 10000, col_count: 50 }
        );
        assert_eq!(info.worksheets[1].id, 42);
        assert_eq!(info.worksheets[1].row_count, 0);
    }

    #[tokio::test]
    async fn test_row_values() {
        let mock_server = MockServer::start().await;
        let client = connect(&mock_server).await;

        let range = format!("/v4/spreadsheets/sheet-123/values/{}", urlencoding::encode("'GPUs'!1:1"));
        Mock::given(method("GET"))
            .and(path(range.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "GPUs!A1:Z1",
                "majorDimension": "ROWS",
                "values": [["Date", "RTX", 12.5]]
            })))
            .mount(&mock_server)
            .await;

        let values = client.row_values(&make_test_worksheet(), 1).await.unwrap();
        assert_eq!(values, vec!["Date", "RTX", "12.5"]);
    }

    #[tokio::test]
    async fn test_col_values_of_empty_sheet() {
        let mock_server = MockServer::start().await;
        let client = connect(&mock_server).await;

        let range = format!("/v4/spreadsheets/sheet-123/values/{}", urlencoding::encode("'GPUs'!A:A"));
        Mock::given(method("GET"))
            .and(path(range.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "range": "GPUs!A1:A10000", "majorDimension": "COLUMNS" })),
            )
            .mount(&mock_server)
            .await;

        let values = client.col_values(&make_test_worksheet(), 1).await.unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_write_row_addresses_explicit_cells() {
        let mock_server = MockServer::start().await;
        let client = connect(&mock_server).await;

        let range = format!("/v4/spreadsheets/sheet-123/values/{}", urlencoding::encode("'GPUs'!A5:C5"));
        Mock::given(method("PUT"))
            .and(path(range.as_str()))
            .and(body_partial_json(json!({
                "majorDimension": "ROWS",
                "values": [["2024/01/01 00:00:00", 499.0, ""]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 3 })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let values = [
            CellValue::text("2024/01/01 00:00:00"),
            CellValue::Number(499.0),
            CellValue::Blank,
        ];
        client.write_row(&make_test_worksheet(), 5, 1, &values).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_worksheet() {
        let mock_server = MockServer::start().await;
        let client = connect(&mock_server).await;

        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-123:batchUpdate"))
            .and(body_partial_json(json!({
                "requests": [{ "addSheet": { "properties": {
                    "title": "Monitors",
                    "gridProperties": { "rowCount": 10000, "columnCount": 50 }
                } } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "sheet-123",
                "replies": [{ "addSheet": { "properties": {
                    "sheetId": 99,
                    "title": "Monitors",
                    "gridProperties": { "rowCount": 10000, "columnCount": 50 }
                } } }]
            })))
            .mount(&mock_server)
            .await;

        let sheet = client.add_worksheet("Monitors", 10000, 50).await.unwrap();
        assert_eq!(sheet.id, 99);
        assert_eq!(sheet.title, "Monitors");
        assert_eq!(sheet.col_count, 50);
    }

    #[tokio::test]
    async fn test_format_range_sends_grid_range() {
        let mock_server = MockServer::start().await;
        let client = connect(&mock_server).await;

        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-123:batchUpdate"))
            .and(body_partial_json(json!({
                "requests": [{ "repeatCell": {
                    "range": {
                        "sheetId": 7,
                        "startRowIndex": 3,
                        "endRowIndex": 4,
                        "startColumnIndex": 1,
                        "endColumnIndex": 4
                    },
                    "cell": { "userEnteredFormat": { "numberFormat": { "type": "CURRENCY" } } }
                } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "replies": [{}] })))
            .expect(1)
            .mount(&mock_server)
            .await;

        client
            .format_range(&make_test_worksheet(), CellRange::row_span(4, 2, 4), NumberFormat::Currency)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_status() {
        let mock_server = MockServer::start().await;
        let client = connect(&mock_server).await;

        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-123:batchUpdate"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&mock_server)
            .await;

        let err = client
            .append_dimension(&make_test_worksheet(), Dimension::Rows, 10000)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Remote { .. }));
        assert!(err.to_string().contains("PERMISSION_DENIED"));
    }
}
