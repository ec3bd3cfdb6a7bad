//! Partner Directory API client
//!
//! Implements the Partner Directory port over the tenant transport. Single
//! items use plain OData entity requests; bulk synchronization funnels
//! create/update/delete operations through the batch protocol client in
//! chunks of at most [`DEFAULT_BATCH_SIZE`](crate::batch::DEFAULT_BATCH_SIZE).

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use skybridge_core::pd::parameter_key;
use skybridge_core::{BinaryParameter, StringParameter, SyncReport};
use skybridge_ports::{
    HttpMethod, ParameterKey, PartnerDirectoryApi, PdApiError, TenantRequest, TenantResponse,
    TenantTransport,
};
use tracing::debug;

use crate::batch::{BatchClient, BatchOperation, DEFAULT_BATCH_SIZE};

const STRING_PARAMETERS: &str = "/api/v1/StringParameters";
const BINARY_PARAMETERS: &str = "/api/v1/BinaryParameters";

/// Partner Directory client over a tenant transport
pub struct PartnerDirectoryClient<T: TenantTransport> {
    transport: T,
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    d: ListResults<T>,
}

#[derive(Deserialize)]
struct ListResults<T> {
    results: Vec<T>,
}

#[derive(Deserialize)]
struct SingleEnvelope<T> {
    d: T,
}

fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

/// Zero means "use the default"; anything larger is capped at the protocol
/// maximum.
fn effective_batch_size(batch_size: usize) -> usize {
    if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size.min(DEFAULT_BATCH_SIZE)
    }
}

fn string_entity_path(pid: &str, id: &str) -> String {
    format!("{}(Pid='{}',Id='{}')", STRING_PARAMETERS, escape(pid), escape(id))
}

fn binary_entity_path(pid: &str, id: &str) -> String {
    format!("{}(Pid='{}',Id='{}')", BINARY_PARAMETERS, escape(pid), escape(id))
}

fn remote_error(context: &str, response: &TenantResponse) -> PdApiError {
    match response.status {
        401 | 403 => PdApiError::Unauthorized(response.status),
        status => PdApiError::Remote {
            status,
            message: format!(
                "{}: {}",
                context,
                String::from_utf8_lossy(&response.body)
            ),
        },
    }
}

impl<T: TenantTransport> PartnerDirectoryClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn execute(&self, request: TenantRequest) -> Result<TenantResponse, PdApiError> {
        self.transport
            .execute(request)
            .await
            .map_err(|e| PdApiError::Transport(e.to_string()))
    }

    async fn list<P: DeserializeOwned>(
        &self,
        collection: &str,
        select: Option<&str>,
    ) -> Result<Vec<P>, PdApiError> {
        let path = match select {
            Some(fields) => format!("{}?$select={}", collection, escape(fields)),
            None => collection.to_string(),
        };

        debug!("Listing {}", path);

        let response = self
            .execute(TenantRequest::new(HttpMethod::Get, path).with_header("Accept", "application/json"))
            .await?;

        if response.status != 200 {
            return Err(remote_error("list failed", &response));
        }

        let envelope: ListEnvelope<P> = serde_json::from_slice(&response.body)
            .map_err(|e| PdApiError::Protocol(format!("failed to decode listing: {}", e)))?;
        Ok(envelope.d.results)
    }

    async fn get_single<P: DeserializeOwned>(
        &self,
        path: String,
    ) -> Result<Option<P>, PdApiError> {
        let response = self
            .execute(TenantRequest::new(HttpMethod::Get, path).with_header("Accept", "application/json"))
            .await?;

        if response.status == 404 {
            return Ok(None);
        }
        if response.status != 200 {
            return Err(remote_error("get failed", &response));
        }

        let envelope: SingleEnvelope<P> = serde_json::from_slice(&response.body)
            .map_err(|e| PdApiError::Protocol(format!("failed to decode entity: {}", e)))?;
        Ok(Some(envelope.d))
    }

    async fn send_mutation(
        &self,
        request: TenantRequest,
        accepted: &[u16],
        context: &str,
    ) -> Result<(), PdApiError> {
        let response = self.execute(request).await?;
        if accepted.contains(&response.status) {
            Ok(())
        } else {
            Err(remote_error(context, &response))
        }
    }

    /// Classify batch responses against the keys that produced them.
    fn classify_sync_responses(
        keys: &[String],
        responses: &[crate::batch::BatchOperationResponse],
        report: &mut SyncReport,
    ) {
        for (key, response) in keys.iter().zip(responses.iter()) {
            if let Some(error) = &response.error {
                report.errors.push(format!("{}: {}", key, error));
            } else if response.status_code == 201 {
                report.created.push(key.clone());
            } else if response.is_success() {
                report.updated.push(key.clone());
            } else {
                report
                    .errors
                    .push(format!("{}: HTTP {}", key, response.status_code));
            }
        }
    }

    fn classify_delete_responses(
        keys: &[String],
        responses: &[crate::batch::BatchOperationResponse],
        report: &mut SyncReport,
    ) {
        for (key, response) in keys.iter().zip(responses.iter()) {
            if let Some(error) = &response.error {
                report.errors.push(format!("{}: {}", key, error));
            } else if response.is_success() {
                report.deleted.push(key.clone());
            } else {
                report
                    .errors
                    .push(format!("{}: HTTP {}", key, response.status_code));
            }
        }
    }
}

fn create_string_op(param: &StringParameter, content_id: String) -> BatchOperation {
    let body = json!({ "Pid": param.pid, "Id": param.id, "Value": param.value });
    BatchOperation {
        method: HttpMethod::Post,
        path: STRING_PARAMETERS.to_string(),
        body: body.to_string().into_bytes(),
        content_id,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        is_query: false,
    }
}

fn update_string_op(param: &StringParameter, content_id: String) -> BatchOperation {
    let body = json!({ "Value": param.value });
    BatchOperation {
        method: HttpMethod::Put,
        path: string_entity_path(&param.pid, &param.id),
        body: body.to_string().into_bytes(),
        content_id,
        headers: vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("If-Match".to_string(), "*".to_string()),
        ],
        is_query: false,
    }
}

fn create_binary_op(param: &BinaryParameter, content_id: String) -> BatchOperation {
    let body = json!({
        "Pid": param.pid,
        "Id": param.id,
        "Value": param.value,
        "ContentType": param.content_type,
    });
    BatchOperation {
        method: HttpMethod::Post,
        path: BINARY_PARAMETERS.to_string(),
        body: body.to_string().into_bytes(),
        content_id,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        is_query: false,
    }
}

fn update_binary_op(param: &BinaryParameter, content_id: String) -> BatchOperation {
    let body = json!({ "Value": param.value, "ContentType": param.content_type });
    BatchOperation {
        method: HttpMethod::Put,
        path: binary_entity_path(&param.pid, &param.id),
        body: body.to_string().into_bytes(),
        content_id,
        headers: vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("If-Match".to_string(), "*".to_string()),
        ],
        is_query: false,
    }
}

fn delete_op(path: String, content_id: String) -> BatchOperation {
    BatchOperation {
        method: HttpMethod::Delete,
        path,
        body: Vec::new(),
        content_id,
        headers: vec![("If-Match".to_string(), "*".to_string())],
        is_query: false,
    }
}

#[async_trait]
impl<T: TenantTransport> PartnerDirectoryApi for PartnerDirectoryClient<T> {
    async fn list_string_parameters(
        &self,
        select: Option<&str>,
    ) -> Result<Vec<StringParameter>, PdApiError> {
        self.list(STRING_PARAMETERS, select).await
    }

    async fn list_binary_parameters(
        &self,
        select: Option<&str>,
    ) -> Result<Vec<BinaryParameter>, PdApiError> {
        self.list(BINARY_PARAMETERS, select).await
    }

    async fn get_string_parameter(
        &self,
        pid: &str,
        id: &str,
    ) -> Result<Option<StringParameter>, PdApiError> {
        self.get_single(string_entity_path(pid, id)).await
    }

    async fn get_binary_parameter(
        &self,
        pid: &str,
        id: &str,
    ) -> Result<Option<BinaryParameter>, PdApiError> {
        self.get_single(binary_entity_path(pid, id)).await
    }

    async fn create_string_parameter(&self, param: &StringParameter) -> Result<(), PdApiError> {
        debug!("Creating string parameter {}/{}", param.pid, param.id);
        let op = create_string_op(param, String::new());
        let request = TenantRequest::new(HttpMethod::Post, op.path)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json")
            .with_body(op.body);
        self.send_mutation(request, &[201], "create string parameter failed")
            .await
    }

    async fn update_string_parameter(&self, param: &StringParameter) -> Result<(), PdApiError> {
        debug!("Updating string parameter {}/{}", param.pid, param.id);
        let op = update_string_op(param, String::new());
        let request = TenantRequest::new(HttpMethod::Put, op.path)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json")
            .with_header("If-Match", "*")
            .with_body(op.body);
        self.send_mutation(request, &[200, 204], "update string parameter failed")
            .await
    }

    async fn delete_string_parameter(&self, pid: &str, id: &str) -> Result<(), PdApiError> {
        debug!("Deleting string parameter {}/{}", pid, id);
        let request = TenantRequest::new(HttpMethod::Delete, string_entity_path(pid, id))
            .with_header("Accept", "application/json")
            .with_header("If-Match", "*");
        self.send_mutation(request, &[200, 204], "delete string parameter failed")
            .await
    }

    async fn create_binary_parameter(&self, param: &BinaryParameter) -> Result<(), PdApiError> {
        debug!("Creating binary parameter {}/{}", param.pid, param.id);
        let op = create_binary_op(param, String::new());
        let request = TenantRequest::new(HttpMethod::Post, op.path)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json")
            .with_body(op.body);
        self.send_mutation(request, &[201], "create binary parameter failed")
            .await
    }

    async fn update_binary_parameter(&self, param: &BinaryParameter) -> Result<(), PdApiError> {
        debug!("Updating binary parameter {}/{}", param.pid, param.id);
        let op = update_binary_op(param, String::new());
        let request = TenantRequest::new(HttpMethod::Put, op.path)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json")
            .with_header("If-Match", "*")
            .with_body(op.body);
        self.send_mutation(request, &[200, 204], "update binary parameter failed")
            .await
    }

    async fn delete_binary_parameter(&self, pid: &str, id: &str) -> Result<(), PdApiError> {
        debug!("Deleting binary parameter {}/{}", pid, id);
        let request = TenantRequest::new(HttpMethod::Delete, binary_entity_path(pid, id))
            .with_header("Accept", "application/json")
            .with_header("If-Match", "*");
        self.send_mutation(request, &[200, 204], "delete binary parameter failed")
            .await
    }

    async fn batch_sync_string_parameters(
        &self,
        params: &[StringParameter],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError> {
        let mut report = SyncReport::default();
        let mut operations = Vec::new();
        let mut keys = Vec::new();

        // Existence probes run serially; only the mutations are batched.
        for param in params {
            let key = parameter_key(&param.pid, &param.id);
            let existing = match self.get_string_parameter(&param.pid, &param.id).await {
                Ok(existing) => existing,
                Err(e) => {
                    report.errors.push(format!("{}: {}", key, e));
                    continue;
                }
            };

            let content_id = (operations.len() + 1).to_string();
            match existing {
                None => {
                    operations.push(create_string_op(param, content_id));
                    keys.push(key);
                }
                Some(existing) if existing.value != param.value => {
                    operations.push(update_string_op(param, content_id));
                    keys.push(key);
                }
                Some(_) => report.unchanged.push(key),
            }
        }

        let client = BatchClient::new(&self.transport);
        let responses = client
            .execute_chunked(&operations, effective_batch_size(batch_size))
            .await
            .map_err(|e| PdApiError::Protocol(e.to_string()))?;

        Self::classify_sync_responses(&keys, &responses, &mut report);
        Ok(report)
    }

    async fn batch_sync_binary_parameters(
        &self,
        params: &[BinaryParameter],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError> {
        let mut report = SyncReport::default();
        let mut operations = Vec::new();
        let mut keys = Vec::new();

        for param in params {
            let key = parameter_key(&param.pid, &param.id);
            let existing = match self.get_binary_parameter(&param.pid, &param.id).await {
                Ok(existing) => existing,
                Err(e) => {
                    report.errors.push(format!("{}: {}", key, e));
                    continue;
                }
            };

            let content_id = (operations.len() + 1).to_string();
            match existing {
                None => {
                    operations.push(create_binary_op(param, content_id));
                    keys.push(key);
                }
                Some(existing)
                    if existing.value != param.value
                        || existing.content_type != param.content_type =>
                {
                    operations.push(update_binary_op(param, content_id));
                    keys.push(key);
                }
                Some(_) => report.unchanged.push(key),
            }
        }

        let client = BatchClient::new(&self.transport);
        let responses = client
            .execute_chunked(&operations, effective_batch_size(batch_size))
            .await
            .map_err(|e| PdApiError::Protocol(e.to_string()))?;

        Self::classify_sync_responses(&keys, &responses, &mut report);
        Ok(report)
    }

    async fn batch_delete_string_parameters(
        &self,
        to_delete: &[ParameterKey],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError> {
        let mut report = SyncReport::default();

        let keys: Vec<String> = to_delete
            .iter()
            .map(|k| parameter_key(&k.pid, &k.id))
            .collect();
        let operations: Vec<BatchOperation> = to_delete
            .iter()
            .enumerate()
            .map(|(i, k)| delete_op(string_entity_path(&k.pid, &k.id), (i + 1).to_string()))
            .collect();

        let client = BatchClient::new(&self.transport);
        let responses = client
            .execute_chunked(&operations, effective_batch_size(batch_size))
            .await
            .map_err(|e| PdApiError::Protocol(e.to_string()))?;

        Self::classify_delete_responses(&keys, &responses, &mut report);
        Ok(report)
    }

    async fn batch_delete_binary_parameters(
        &self,
        to_delete: &[ParameterKey],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError> {
        let mut report = SyncReport::default();

        let keys: Vec<String> = to_delete
            .iter()
            .map(|k| parameter_key(&k.pid, &k.id))
            .collect();
        let operations: Vec<BatchOperation> = to_delete
            .iter()
            .enumerate()
            .map(|(i, k)| delete_op(binary_entity_path(&k.pid, &k.id), (i + 1).to_string()))
            .collect();

        let client = BatchClient::new(&self.transport);
        let responses = client
            .execute_chunked(&operations, effective_batch_size(batch_size))
            .await
            .map_err(|e| PdApiError::Protocol(e.to_string()))?;

        Self::classify_delete_responses(&keys, &responses, &mut report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMethod, ServiceCredentials};
    use crate::http::HttpTransport;
    use mockito::Server;

    fn client_for(server: &Server) -> PartnerDirectoryClient<HttpTransport> {
        let credentials = ServiceCredentials {
            host: server.url(),
            auth: AuthMethod::None,
        };
        PartnerDirectoryClient::new(HttpTransport::new(&credentials).unwrap())
    }

    #[tokio::test]
    async fn test_list_string_parameters_with_selection() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/StringParameters?$select=Pid%2CId%2CValue")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"d":{"results":[
                    {"Pid":"P1","Id":"s1","Value":"v1"},
                    {"Pid":"P2","Id":"s2","Value":"v2"}
                ]}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let params = client
            .list_string_parameters(Some("Pid,Id,Value"))
            .await
            .unwrap();

        assert_eq!(params.len(), 2);
        assert_eq!(params[0].pid, "P1");
        assert_eq!(params[1].value, "v2");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_string_parameter_absent_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/StringParameters(Pid='P1',Id='missing')")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client.get_string_parameter("P1", "missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_binary_parameter_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/BinaryParameters(Pid='P1',Id='cert')")
            .with_status(200)
            .with_body(
                r#"{"d":{"Pid":"P1","Id":"cert","Value":"QUJD","ContentType":"crt"}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let param = client
            .get_binary_parameter("P1", "cert")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(param.value, "QUJD");
        assert_eq!(param.content_type, "crt");
    }

    #[tokio::test]
    async fn test_create_string_parameter_requires_201() {
        let mut server = Server::new_async().await;
        let created = server
            .mock("POST", "/api/v1/StringParameters")
            .match_body(r#"{"Id":"s1","Pid":"P1","Value":"v1"}"#)
            .with_status(201)
            .create_async()
            .await;

        let client = client_for(&server);
        let param = StringParameter {
            pid: "P1".to_string(),
            id: "s1".to_string(),
            value: "v1".to_string(),
        };
        client.create_string_parameter(&param).await.unwrap();
        created.assert_async().await;

        server
            .mock("POST", "/api/v1/StringParameters")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let result = client.create_string_parameter(&param).await;
        assert!(matches!(result, Err(PdApiError::Remote { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_dedicated_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/StringParameters")
            .with_status(401)
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client.list_string_parameters(None).await;
        assert!(matches!(result, Err(PdApiError::Unauthorized(401))));
    }

    #[tokio::test]
    async fn test_batch_sync_classifies_by_status() {
        let mut server = Server::new_async().await;

        // Probes: s1 absent, s2 present with a different value, s3 unchanged.
        server
            .mock("GET", "/api/v1/StringParameters(Pid='P1',Id='s1')")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/StringParameters(Pid='P1',Id='s2')")
            .with_status(200)
            .with_body(r#"{"d":{"Pid":"P1","Id":"s2","Value":"old"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/StringParameters(Pid='P1',Id='s3')")
            .with_status(200)
            .with_body(r#"{"d":{"Pid":"P1","Id":"s3","Value":"same"}}"#)
            .create_async()
            .await;

        let batch_response = concat!(
            "--outer\r\n",
            "Content-Type: multipart/mixed; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: application/http\r\n",
            "Content-ID: 1\r\n",
            "\r\n",
            "HTTP/1.1 201 Created\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: application/http\r\n",
            "Content-ID: 2\r\n",
            "\r\n",
            "HTTP/1.1 204 No Content\r\n",
            "\r\n",
            "--inner--\r\n",
            "--outer--\r\n",
        );
        server
            .mock("POST", "/api/v1/$batch")
            .with_status(202)
            .with_header("content-type", "multipart/mixed; boundary=outer")
            .with_body(batch_response)
            .create_async()
            .await;

        let client = client_for(&server);
        let params = vec![
            StringParameter {
                pid: "P1".to_string(),
                id: "s1".to_string(),
                value: "new".to_string(),
            },
            StringParameter {
                pid: "P1".to_string(),
                id: "s2".to_string(),
                value: "changed".to_string(),
            },
            StringParameter {
                pid: "P1".to_string(),
                id: "s3".to_string(),
                value: "same".to_string(),
            },
        ];

        let report = client
            .batch_sync_string_parameters(&params, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        assert_eq!(report.created, vec!["P1/s1"]);
        assert_eq!(report.updated, vec!["P1/s2"]);
        assert_eq!(report.unchanged, vec!["P1/s3"]);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_batch_delete_reports_deleted_keys() {
        let mut server = Server::new_async().await;

        let batch_response = concat!(
            "--outer\r\n",
            "Content-Type: multipart/mixed; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: application/http\r\n",
            "Content-ID: 1\r\n",
            "\r\n",
            "HTTP/1.1 204 No Content\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: application/http\r\n",
            "Content-ID: 2\r\n",
            "\r\n",
            "HTTP/1.1 404 Not Found\r\n",
            "\r\n",
            "--inner--\r\n",
            "--outer--\r\n",
        );
        server
            .mock("POST", "/api/v1/$batch")
            .with_status(202)
            .with_header("content-type", "multipart/mixed; boundary=outer")
            .with_body(batch_response)
            .create_async()
            .await;

        let client = client_for(&server);
        let keys = vec![
            ParameterKey::new("P1", "gone"),
            ParameterKey::new("P1", "already-gone"),
        ];

        let report = client
            .batch_delete_string_parameters(&keys, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["P1/gone"]);
        assert_eq!(report.errors, vec!["P1/already-gone: HTTP 404"]);
    }
}
