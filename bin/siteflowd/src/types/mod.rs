pub mod audit;
pub mod backup;
pub mod graph;
pub mod site;
pub mod ws;

pub use audit::{AuditEntry, AuditPage, AuditQuery, AuditStatus, TargetType};
pub use backup::{BackupRun, BackupRunInput, JobType, OverallStatus, RestorePoint, RunStatus, SiteBackupStatus};
pub use graph::{Graph, GraphEdge, GraphNode, NodeMetrics, NodeStatus, NodeType};
pub use site::{Container, Route, Service, Site, SiteStatus};
pub use ws::{ActionOutputStatus, ClientMessage, ServerMessage};
