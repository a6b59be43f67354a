//! ACL authorization and client identity extraction.
//!
//! Every RPC is authorized as a `(subject, object, action)` triple, where
//! the subject is the CommonName of the caller's verified client
//! certificate and the object is always the wildcard. Policies are
//! evaluated by a casbin enforcer loaded from a model file and a policy
//! file at startup.

use std::path::Path;

use casbin::{CoreApi, DefaultModel, Enforcer, FileAdapter};
use tonic::{Request, Status};
use x509_parser::prelude::*;

use crate::error::{JobdError, Result};

pub const OBJECT_WILDCARD: &str = "*";
pub const ACTION_CREATE: &str = "create";
pub const ACTION_READ: &str = "read";
pub const ACTION_DELETE: &str = "delete";

pub struct Authorizer {
    enforcer: Enforcer,
}

impl Authorizer {
    /// Build an authorizer from casbin model and policy files.
    pub async fn new(model_file: &Path, policy_file: &Path) -> Result<Self> {
        let model = DefaultModel::from_file(model_file).await?;
        let adapter = FileAdapter::new(policy_file.to_path_buf());
        let enforcer = Enforcer::new(model, adapter).await?;

        Ok(Self { enforcer })
    }

    /// Check whether `subject` may perform `action` on `object`.
    pub fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<()> {
        if self.enforcer.enforce((subject, object, action))? {
            Ok(())
        } else {
            Err(JobdError::PermissionDenied {
                subject: subject.to_owned(),
                object: object.to_owned(),
                action: action.to_owned(),
            })
        }
    }
}

/// Extract the authorization subject from a request: the CommonName of the
/// first certificate in the caller's verified chain.
pub fn subject_common_name<T>(request: &Request<T>) -> std::result::Result<String, Status> {
    let certs = request
        .peer_certs()
        .ok_or_else(|| Status::unauthenticated("no client certificate presented"))?;

    let cert = certs
        .first()
        .ok_or_else(|| Status::unauthenticated("no client certificate presented"))?;

    let (_, parsed) = X509Certificate::from_der(cert.as_ref())
        .map_err(|_| Status::unauthenticated("malformed client certificate"))?;

    let common_name = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .ok_or_else(|| Status::unauthenticated("client certificate has no common name"))?;

    Ok(common_name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

    const POLICY: &str = "\
p, root, *, create
p, root, *, read
p, root, *, delete
p, viewer, *, read
";

    async fn test_authorizer() -> (tempfile::TempDir, Authorizer) {
        let dir = tempfile::tempdir().unwrap();
        let model_file = dir.path().join("model.conf");
        let policy_file = dir.path().join("policy.csv");
        std::fs::write(&model_file, MODEL).unwrap();
        std::fs::write(&policy_file, POLICY).unwrap();

        let authorizer = Authorizer::new(&model_file, &policy_file).await.unwrap();
        (dir, authorizer)
    }

    #[tokio::test]
    async fn test_root_permitted_all_actions() {
        let (_dir, authorizer) = test_authorizer().await;

        for action in [ACTION_CREATE, ACTION_READ, ACTION_DELETE] {
            authorizer
                .authorize("root", OBJECT_WILDCARD, action)
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_viewer_read_only() {
        let (_dir, authorizer) = test_authorizer().await;

        authorizer
            .authorize("viewer", OBJECT_WILDCARD, ACTION_READ)
            .unwrap();
        let result = authorizer.authorize("viewer", OBJECT_WILDCARD, ACTION_CREATE);
        assert!(matches!(
            result,
            Err(JobdError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_denied_message_names_subject_action_object() {
        let (_dir, authorizer) = test_authorizer().await;

        let err = authorizer
            .authorize("nobody", OBJECT_WILDCARD, ACTION_CREATE)
            .unwrap_err();
        assert_eq!(err.to_string(), "nobody not permitted to create on *");
    }

    #[tokio::test]
    async fn test_missing_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let model_file = dir.path().join("model.conf");
        std::fs::write(&model_file, MODEL).unwrap();

        let result = Authorizer::new(&model_file, &dir.path().join("missing.csv")).await;
        assert!(result.is_err());
    }
}
