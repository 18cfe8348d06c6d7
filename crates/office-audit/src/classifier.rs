//! Infers (action, entity type, entity id) from a request's method and path.

use office_types::{AuditAction, AuditEntityType};

/// Path fragments never audited (substring match).
pub const SKIP_PATHS: [&str; 5] = [
    "/api/audit/",
    "/api/dashboard/",
    "/api/profile",
    "/api/files/download",
    "/api/files/thumbnail",
];

/// Resource segments whose following segment is an entity id.
const ID_SEGMENTS: [&str; 5] = [
    "incoming-documents",
    "outgoing-documents",
    "tasks",
    "users",
    "files",
];

const CONFIG_SEGMENTS: [&str; 4] = [
    "/document-types",
    "/issuing-units",
    "/receiving-units",
    "/notifications",
];

pub fn should_skip(path: &str) -> bool {
    SKIP_PATHS.iter().any(|p| path.contains(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    /// 0 when the path carries no id (creates).
    pub entity_id: u64,
}

impl Classification {
    fn new(action: AuditAction, entity_type: AuditEntityType, entity_id: u64) -> Option<Self> {
        Some(Self {
            action,
            entity_type,
            entity_id,
        })
    }
}

/// Maps a request shape to an auditable action. `None` means "not audited".
pub trait RouteClassifier: Send + Sync {
    fn classify(&self, method: &str, path: &str) -> Option<Classification>;
}

/// Default classifier, first match wins: documents, tasks, users, files, configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRouteClassifier;

impl RouteClassifier for PathRouteClassifier {
    fn classify(&self, method: &str, path: &str) -> Option<Classification> {
        use AuditAction as A;
        use AuditEntityType as E;

        let id = extract_entity_id(path);

        if path.contains("/incoming-documents") {
            return match method {
                "POST" => Classification::new(A::DocumentCreate, E::IncomingDocument, 0),
                "PUT" if path.contains("/assign") => {
                    Classification::new(A::DocumentAssign, E::IncomingDocument, id)
                }
                "PUT" => Classification::new(A::DocumentUpdate, E::IncomingDocument, id),
                "DELETE" => Classification::new(A::DocumentDelete, E::IncomingDocument, id),
                _ => None,
            };
        }

        if path.contains("/outgoing-documents") {
            return match method {
                "POST" => Classification::new(A::DocumentCreate, E::OutgoingDocument, 0),
                "PUT" => Classification::new(A::DocumentUpdate, E::OutgoingDocument, id),
                "DELETE" => Classification::new(A::DocumentDelete, E::OutgoingDocument, id),
                _ => None,
            };
        }

        if path.contains("/tasks") {
            return match method {
                "POST" if path.contains("/forward") => Classification::new(A::TaskForward, E::Task, id),
                "POST" if path.contains("/delegate") => {
                    Classification::new(A::TaskDelegate, E::Task, id)
                }
                // POST on an existing task (e.g. comments) changes it rather than creating one.
                "POST" if id > 0 => Classification::new(A::TaskUpdate, E::Task, id),
                "POST" => Classification::new(A::TaskCreate, E::Task, 0),
                "PUT" if path.contains("/assign") => Classification::new(A::TaskAssign, E::Task, id),
                "PUT" => Classification::new(A::TaskUpdate, E::Task, id),
                "DELETE" => Classification::new(A::TaskDelete, E::Task, id),
                _ => None,
            };
        }

        if path.contains("/users") {
            return match method {
                "POST" => Classification::new(A::UserCreate, E::User, 0),
                "PUT" => Classification::new(A::UserUpdate, E::User, id),
                "DELETE" => Classification::new(A::UserDelete, E::User, id),
                _ => None,
            };
        }

        if path.contains("/files") {
            return match method {
                "POST" => Classification::new(A::FileUpload, E::File, 0),
                "DELETE" => Classification::new(A::FileDelete, E::File, 0),
                _ => None,
            };
        }

        if method != "GET" && CONFIG_SEGMENTS.iter().any(|s| path.contains(s)) {
            return Classification::new(A::SystemConfig, E::System, id);
        }

        None
    }
}

/// Id in the segment after the first resource segment that carries one; 0 otherwise.
pub fn extract_entity_id(path: &str) -> u64 {
    let parts: Vec<&str> = path.split('/').collect();
    parts
        .windows(2)
        .filter(|w| ID_SEGMENTS.contains(&w[0]))
        .find_map(|w| parse_id(w[1]))
        .unwrap_or(0)
}

fn parse_id(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse::<u64>().ok().filter(|id| *id > 0)
}

/// Human-readable sentence for an audit row.
pub fn describe(action: AuditAction, method: &str, path: &str) -> String {
    use AuditAction as A;

    let incoming = path.contains("incoming");
    let text = match action {
        A::DocumentCreate if incoming => "Created new incoming document",
        A::DocumentCreate => "Created new outgoing document",
        A::DocumentUpdate if incoming => "Updated incoming document",
        A::DocumentUpdate => "Updated outgoing document",
        A::DocumentDelete if incoming => "Deleted incoming document",
        A::DocumentDelete => "Deleted outgoing document",
        A::DocumentAssign => "Assigned document processor",
        A::TaskCreate => "Created new task",
        A::TaskUpdate if path.contains("/status") => "Updated task status",
        A::TaskUpdate if path.contains("/submit-review") => "Submitted task for review",
        A::TaskUpdate if path.contains("/processing") => "Updated task processing content",
        A::TaskUpdate if path.contains("/comments") => "Commented on task",
        A::TaskUpdate => "Updated task",
        A::TaskDelete => "Deleted task",
        A::TaskAssign => "Assigned task",
        A::TaskForward => "Forwarded task",
        A::TaskDelegate => "Delegated task",
        A::UserCreate => "Created new user",
        A::UserUpdate => "Updated user information",
        A::UserDelete => "Deleted user",
        A::FileUpload => "Uploaded file",
        A::FileDelete => "Deleted file",
        A::SystemConfig => "Updated system configuration",
        _ => return format!("{} {}", method, path),
    };
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use AuditAction as A;
    use AuditEntityType as E;

    fn classify(method: &str, path: &str) -> Option<(AuditAction, AuditEntityType, u64)> {
        PathRouteClassifier
            .classify(method, path)
            .map(|c| (c.action, c.entity_type, c.entity_id))
    }

    #[test]
    fn task_routes() {
        assert_eq!(classify("POST", "/api/tasks"), Some((A::TaskCreate, E::Task, 0)));
        assert_eq!(classify("PUT", "/api/tasks/7/assign"), Some((A::TaskAssign, E::Task, 7)));
        assert_eq!(classify("PUT", "/api/tasks/7/status"), Some((A::TaskUpdate, E::Task, 7)));
        assert_eq!(classify("PUT", "/api/tasks/7/submit-review"), Some((A::TaskUpdate, E::Task, 7)));
        assert_eq!(classify("POST", "/api/tasks/7/forward"), Some((A::TaskForward, E::Task, 7)));
        assert_eq!(classify("POST", "/api/tasks/7/delegate"), Some((A::TaskDelegate, E::Task, 7)));
        assert_eq!(classify("POST", "/api/tasks/7/comments"), Some((A::TaskUpdate, E::Task, 7)));
        assert_eq!(classify("DELETE", "/api/tasks/7"), Some((A::TaskDelete, E::Task, 7)));
        assert_eq!(classify("GET", "/api/tasks/7"), None);
    }

    #[test]
    fn document_routes_take_priority() {
        assert_eq!(
            classify("PUT", "/api/incoming-documents/3/assign"),
            Some((A::DocumentAssign, E::IncomingDocument, 3))
        );
        assert_eq!(
            classify("PUT", "/api/outgoing-documents/4/assign"),
            Some((A::DocumentUpdate, E::OutgoingDocument, 4))
        );
        assert_eq!(
            classify("POST", "/api/incoming-documents/3/tasks"),
            Some((A::DocumentCreate, E::IncomingDocument, 0))
        );
    }

    #[test]
    fn other_resources() {
        assert_eq!(classify("GET", "/api/users"), None);
        assert_eq!(classify("PUT", "/api/users/12"), Some((A::UserUpdate, E::User, 12)));
        assert_eq!(classify("DELETE", "/api/files/5"), Some((A::FileDelete, E::File, 0)));
        assert_eq!(classify("PUT", "/api/files/5"), None);
        assert_eq!(
            classify("PUT", "/api/issuing-units/2"),
            Some((A::SystemConfig, E::System, 0))
        );
        assert_eq!(classify("GET", "/api/document-types"), None);
        assert_eq!(classify("POST", "/api/unknown"), None);
    }

    #[test]
    fn entity_id_extraction() {
        assert_eq!(extract_entity_id("/api/tasks/42/status"), 42);
        assert_eq!(extract_entity_id("/api/tasks/abc"), 0);
        assert_eq!(extract_entity_id("/api/tasks/+5"), 0);
        assert_eq!(extract_entity_id("/api/tasks/0"), 0);
        assert_eq!(extract_entity_id("/api/tasks"), 0);
        assert_eq!(extract_entity_id("/api/users/99999999999999999999999"), 0);
    }

    #[test]
    fn skip_list() {
        assert!(should_skip("/api/audit/logs"));
        assert!(should_skip("/api/files/download/3"));
        assert!(should_skip("/api/profile"));
        assert!(!should_skip("/api/tasks"));
    }

    #[test]
    fn descriptions() {
        assert_eq!(describe(A::TaskCreate, "POST", "/api/tasks"), "Created new task");
        assert_eq!(describe(A::TaskUpdate, "PUT", "/api/tasks/1/status"), "Updated task status");
        assert_eq!(
            describe(A::DocumentCreate, "POST", "/api/incoming-documents"),
            "Created new incoming document"
        );
        assert_eq!(describe(A::UserLogin, "POST", "/api/login"), "POST /api/login");
    }
}
