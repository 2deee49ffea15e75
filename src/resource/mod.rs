//! Resource model and collection machinery
//!
//! One concrete record shape per resource kind, plus the pieces that turn a
//! remote listing API into a stream of records:
//!
//! - [`pager`] - Lazy multi-page cursor over a listing call
//! - [`lister`] - One listing capability per resource kind
//! - [`reader`] - Rate-limited, bounded-retry wrapper around a listing call
//!
//! Records are immutable once read from the API; identity is the
//! provider-assigned ID. Only the fields the accounting pipeline needs are
//! modeled, everything else in the payload is ignored.

pub mod lister;
pub mod pager;
pub mod reader;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The resource kinds this collector enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Servers,
    Users,
    Images,
    Shares,
    FloatingIps,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Servers => "servers",
            ResourceKind::Users => "users",
            ResourceKind::Images => "images",
            ResourceKind::Shares => "shares",
            ResourceKind::FloatingIps => "floating-ips",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub created: Option<DateTime<Utc>>,
    /// Populated by the usage extension once the server is gone.
    #[serde(
        rename = "OS-SRV-USG:terminated_at",
        default,
        deserialize_with = "timestamp::option"
    )]
    pub terminated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// An image snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<String>,
    /// Image size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
}

/// A shared file system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    /// Share size in GiB.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// A floating IP address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    #[serde(default)]
    pub floating_ip_address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// An identity project. Accounting scopes usage per project, so projects are
/// collected as the user dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One cloud entity, polymorphic over the resource kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Server(Server),
    Image(Image),
    Share(Share),
    FloatingIp(FloatingIp),
    Project(Project),
}

impl Resource {
    /// Provider-assigned identity.
    pub fn id(&self) -> &str {
        match self {
            Resource::Server(s) => &s.id,
            Resource::Image(i) => &i.id,
            Resource::Share(s) => &s.id,
            Resource::FloatingIp(f) => &f.id,
            Resource::Project(p) => &p.id,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Server(_) => ResourceKind::Servers,
            Resource::Image(_) => ResourceKind::Images,
            Resource::Share(_) => ResourceKind::Shares,
            Resource::FloatingIp(_) => ResourceKind::FloatingIps,
            Resource::Project(_) => ResourceKind::Users,
        }
    }

    /// When the resource came into existence, if the API reports it.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Resource::Server(s) => s.created,
            Resource::Image(i) => i.created_at,
            Resource::Share(s) => s.created_at,
            Resource::FloatingIp(f) => f.created_at,
            Resource::Project(_) => None,
        }
    }

    /// When the resource stopped existing. `None` for kinds without a
    /// termination notion and for resources that are still active.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Resource::Server(s) => s.terminated_at,
            Resource::Image(i) => i.deleted_at,
            Resource::Share(_) | Resource::FloatingIp(_) | Resource::Project(_) => None,
        }
    }
}

/// Timestamp parsing for the two formats OpenStack APIs emit: RFC 3339 with
/// an offset ("2017-02-14T19:23:58Z") and naive microseconds without one
/// ("2015-09-18T10:25:24.000000").
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
            })
    }

    pub fn option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => parse(&raw).map(Some).map_err(Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_parses_usage_extension_timestamps() {
        let server: Server = serde_json::from_value(json!({
            "id": "9168b536",
            "name": "vm-1",
            "status": "ACTIVE",
            "created": "2017-02-14T19:23:58Z",
            "OS-SRV-USG:terminated_at": null,
            "tenant_id": "6f70656e"
        }))
        .unwrap();

        let resource = Resource::Server(server);
        assert_eq!(resource.id(), "9168b536");
        assert_eq!(resource.kind(), ResourceKind::Servers);
        assert!(resource.started_at().is_some());
        assert!(resource.ended_at().is_none());
    }

    #[test]
    fn share_parses_naive_microsecond_timestamps() {
        let share: Share = serde_json::from_value(json!({
            "id": "011d21e2",
            "name": "share-1",
            "status": "available",
            "created_at": "2015-09-18T10:25:24.000000",
            "size": 1
        }))
        .unwrap();

        let created = share.created_at.unwrap();
        assert_eq!(created.to_rfc3339(), "2015-09-18T10:25:24+00:00");
    }

    #[test]
    fn image_deleted_at_is_the_end_of_life() {
        let image: Image = serde_json::from_value(json!({
            "id": "781b3762",
            "created_at": "2016-05-10T12:11:32Z",
            "deleted_at": "2016-06-01T08:00:00Z"
        }))
        .unwrap();

        let resource = Resource::Image(image);
        assert!(resource.ended_at().is_some());
        assert!(resource.started_at() < resource.ended_at());
    }

    #[test]
    fn projects_have_no_lifetime_bounds() {
        let project: Project = serde_json::from_value(json!({
            "id": "263fd9",
            "name": "accounting",
            "enabled": true
        }))
        .unwrap();

        let resource = Resource::Project(project);
        assert_eq!(resource.kind(), ResourceKind::Users);
        assert!(resource.started_at().is_none());
        assert!(resource.ended_at().is_none());
    }

    #[test]
    fn resources_serialize_with_a_kind_tag() {
        let resource = Resource::FloatingIp(FloatingIp {
            id: "2f245a7b".into(),
            floating_ip_address: Some("172.24.4.228".into()),
            status: Some("ACTIVE".into()),
            created_at: None,
            tenant_id: Some("4969c491".into()),
        });

        let line = serde_json::to_value(&resource).unwrap();
        assert_eq!(line["kind"], "floating_ip");
        assert_eq!(line["id"], "2f245a7b");
    }
}
