//! C5 Relationship Engine Client: a thin, retrying wrapper around the
//! Authzed/SpiceDB-shaped Permissions gRPC service. Schema writes are
//! append-only (callers may only add type/relation definitions, never
//! remove the ones already applied); relationship writes retry with
//! exponential backoff; permission checks and resource lookups are read-only.

use std::time::Duration;

use tonic::transport::Channel;
use tonic::Request;

use crate::error::AppError;

use super::proto::permissions_service_client::PermissionsServiceClient;
use super::proto::{
    CheckPermissionRequest, DeleteRelationshipsRequest, LookupResourcesRequest, ObjectReference,
    Permissionship, ReadSchemaRequest, Relationship, RelationshipFilter, RelationshipUpdate,
    RelationshipUpdateOperation, SubjectReference, WriteRelationshipsRequest, WriteSchemaRequest,
};

const MAX_RETRIES: u32 = 5;
const MAX_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RelationshipEngineClient {
    inner: PermissionsServiceClient<Channel>,
    token: String,
}

impl RelationshipEngineClient {
    pub async fn connect(endpoint: &str, token: &str) -> Result<Self, AppError> {
        let channel = Channel::from_shared(endpoint.to_string())
            .map_err(|e| AppError::Configuration(format!("invalid spicedb endpoint: {e}")))?
            .connect()
            .await
            .map_err(|e| AppError::ExternalService(format!("failed to connect to relationship engine: {e}")))?;

        Ok(Self {
            inner: PermissionsServiceClient::new(channel),
            token: token.to_string(),
        })
    }

    fn authed<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Ok(value) = format!("Bearer {}", self.token).parse() {
            request.metadata_mut().insert("authorization", value);
        }
        request
    }

    /// Writes (never removes) schema definitions. The engine itself enforces
    /// append-only semantics; this call is a direct passthrough.
    pub async fn write_schema(&self, schema_text: &str) -> Result<(), AppError> {
        let mut client = self.inner.clone();
        client
            .write_schema(self.authed(WriteSchemaRequest {
                schema: schema_text.to_string(),
            }))
            .await
            .map_err(|e| AppError::ExternalService(format!("write_schema failed: {e}")))?;
        Ok(())
    }

    pub async fn read_schema(&self) -> Result<String, AppError> {
        let mut client = self.inner.clone();
        let response = client
            .read_schema(self.authed(ReadSchemaRequest {}))
            .await
            .map_err(|e| AppError::ExternalService(format!("read_schema failed: {e}")))?;
        Ok(response.into_inner().schema_text)
    }

    /// Writes relationships with exponential backoff retry: attempts 0..5,
    /// delay doubling from 50ms and capped at 2s, so a transient engine blip
    /// doesn't fail a mutation outright.
    pub async fn write_relationships(&self, updates: Vec<RelationshipUpdate>) -> Result<(), AppError> {
        let mut attempt = 0;
        loop {
            let mut client = self.inner.clone();
            let request = self.authed(WriteRelationshipsRequest {
                updates: updates.clone(),
            });
            match client.write_relationships(request).await {
                Ok(_) => return Ok(()),
                Err(status) if attempt < MAX_RETRIES && is_retryable(&status) => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(attempt, error = %status, "retrying relationship engine write");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(status) => {
                    return Err(AppError::ExternalService(format!(
                        "write_relationships failed after {attempt} attempts: {status}"
                    )))
                }
            }
        }
    }

    pub async fn write_relationship(
        &self,
        resource_type: &str,
        resource_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<(), AppError> {
        let update = RelationshipUpdate {
            operation: RelationshipUpdateOperation::OperationTouch as i32,
            relationship: Some(Relationship {
                resource: Some(ObjectReference {
                    object_type: resource_type.to_string(),
                    object_id: resource_id.to_string(),
                }),
                relation: relation.to_string(),
                subject: Some(SubjectReference {
                    object: Some(ObjectReference {
                        object_type: subject_type.to_string(),
                        object_id: subject_id.to_string(),
                    }),
                    optional_relation: String::new(),
                }),
            }),
        };
        self.write_relationships(vec![update]).await
    }

    pub async fn delete_relationships(
        &self,
        resource_type: &str,
        resource_id: Option<&str>,
        relation: Option<&str>,
    ) -> Result<(), AppError> {
        let mut client = self.inner.clone();
        let filter = RelationshipFilter {
            resource_type: resource_type.to_string(),
            optional_resource_id: resource_id.unwrap_or_default().to_string(),
            optional_relation: relation.unwrap_or_default().to_string(),
        };
        client
            .delete_relationships(self.authed(DeleteRelationshipsRequest {
                relationship_filter: Some(filter),
            }))
            .await
            .map_err(|e| AppError::ExternalService(format!("delete_relationships failed: {e}")))?;
        Ok(())
    }

    pub async fn check_permission(
        &self,
        resource_type: &str,
        resource_id: &str,
        permission: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<bool, AppError> {
        let mut client = self.inner.clone();
        let response = client
            .check_permission(self.authed(CheckPermissionRequest {
                resource: Some(ObjectReference {
                    object_type: resource_type.to_string(),
                    object_id: resource_id.to_string(),
                }),
                permission: permission.to_string(),
                subject: Some(SubjectReference {
                    object: Some(ObjectReference {
                        object_type: subject_type.to_string(),
                        object_id: subject_id.to_string(),
                    }),
                    optional_relation: String::new(),
                }),
            }))
            .await
            .map_err(|e| AppError::ExternalService(format!("check_permission failed: {e}")))?;

        Ok(response.into_inner().permissionship == Permissionship::PermissionshipHasPermission as i32)
    }

    pub async fn lookup_resources(
        &self,
        resource_type: &str,
        permission: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut client = self.inner.clone();
        let mut stream = client
            .lookup_resources(self.authed(LookupResourcesRequest {
                resource_object_type: resource_type.to_string(),
                permission: permission.to_string(),
                subject: Some(SubjectReference {
                    object: Some(ObjectReference {
                        object_type: subject_type.to_string(),
                        object_id: subject_id.to_string(),
                    }),
                    optional_relation: String::new(),
                }),
            }))
            .await
            .map_err(|e| AppError::ExternalService(format!("lookup_resources failed: {e}")))?
            .into_inner();

        let mut ids = Vec::new();
        while let Some(message) = stream
            .message()
            .await
            .map_err(|e| AppError::ExternalService(format!("lookup_resources stream error: {e}")))?
        {
            ids.push(message.resource_object_id);
        }
        Ok(ids)
    }
}

fn is_retryable(status: &tonic::Status) -> bool {
    use tonic::Code;
    matches!(
        status.code(),
        Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Aborted
    )
}

fn backoff_delay(attempt: u32) -> Duration {
    let millis = 50u64.saturating_mul(1 << attempt.min(10));
    Duration::from_millis(millis).min(MAX_BACKOFF)
}
