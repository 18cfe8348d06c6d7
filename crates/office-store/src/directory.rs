//! In-memory user and document directories.
//!
//! User and document management live outside this service; these are the
//! read-only views the engine and audit service consume, seeded at startup
//! or by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use office_types::{
    DirectoryError, DocumentDirectory, DocumentId, DocumentInfo, DocumentKind, Role, User,
    UserDirectory, UserId,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    /// Insert or replace a user.
    pub async fn upsert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, DirectoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_active_by_role(&self, role: Role) -> Result<Option<User>, DirectoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.role == role && u.is_active)
            .cloned())
    }
}

pub struct InMemoryDocumentDirectory {
    documents: RwLock<Vec<DocumentInfo>>,
}

impl InMemoryDocumentDirectory {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
        }
    }

    pub fn with_documents(documents: impl IntoIterator<Item = DocumentInfo>) -> Self {
        Self {
            documents: RwLock::new(documents.into_iter().collect()),
        }
    }

    pub async fn insert(&self, document: DocumentInfo) {
        self.documents.write().await.push(document);
    }
}

impl Default for InMemoryDocumentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentDirectory for InMemoryDocumentDirectory {
    async fn document_exists(&self, id: DocumentId) -> Result<bool, DirectoryError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .any(|d| d.id == id && d.kind == DocumentKind::Incoming))
    }

    async fn list_documents(
        &self,
        kind: DocumentKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DocumentInfo>, DirectoryError> {
        let mut out: Vec<DocumentInfo> = self
            .documents
            .read()
            .await
            .iter()
            .filter(|d| d.kind == kind && d.created_at >= start && d.created_at <= end)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId, role: Role, is_active: bool) -> User {
        User {
            id,
            name: format!("user-{id}"),
            role,
            is_active,
        }
    }

    #[tokio::test]
    async fn find_active_by_role_skips_inactive_users() {
        let dir = InMemoryUserDirectory::with_users([
            user(1, Role::TeamLeader, false),
            user(2, Role::TeamLeader, true),
            user(3, Role::Deputy, true),
        ]);
        let found = dir.find_active_by_role(Role::TeamLeader).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(2));
        assert!(dir.find_active_by_role(Role::Admin).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_incoming_documents_can_be_linked() {
        let now = Utc::now();
        let doc = |id, kind| DocumentInfo {
            id,
            kind,
            number: format!("{id}/CV"),
            summary: String::new(),
            status: "received".into(),
            created_by: 1,
            processor: None,
            created_at: now,
            updated_at: now,
        };
        let dir = InMemoryDocumentDirectory::with_documents([
            doc(10, DocumentKind::Incoming),
            doc(11, DocumentKind::Outgoing),
        ]);
        assert!(dir.document_exists(10).await.unwrap());
        assert!(!dir.document_exists(11).await.unwrap());
        let out = dir
            .list_documents(DocumentKind::Outgoing, now, now)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }
}
