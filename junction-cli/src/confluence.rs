//! `RemoteSpaceClient` for the Confluence Cloud REST API (`/wiki/rest/api`).

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};

use junction_core::PageId;
use junction_delta::{RemoteSpaceClient, TransportError};

/// Credentials and target space for one run.
#[derive(Debug, Clone)]
pub struct ConfluenceSettings {
    /// e.g. `https://example.atlassian.net/wiki/rest/api`
    pub api_url: String,
    pub user: String,
    pub key: String,
    pub space: String,
}

pub struct ConfluenceClient {
    agent: ureq::Agent,
    base: String,
    auth: String,
    space: String,
}

#[derive(Debug, Deserialize)]
struct ContentRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Version {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct Content {
    id: String,
    #[serde(default)]
    ancestors: Vec<ContentRef>,
    version: Option<Version>,
}

#[derive(Debug, Deserialize)]
struct ContentArray {
    results: Vec<Content>,
}

fn transport(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(code, response) => TransportError::Status {
            code,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(t) => TransportError::Connection(t.to_string()),
    }
}

fn decode(err: std::io::Error) -> TransportError {
    TransportError::Decode(err.to_string())
}

impl ConfluenceClient {
    pub fn new(settings: ConfluenceSettings) -> Self {
        let token = BASE64.encode(format!("{}:{}", settings.user, settings.key));
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            base: settings.api_url.trim_end_matches('/').to_string(),
            auth: format!("Basic {token}"),
            space: settings.space,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn get(&self, path: &str) -> ureq::Request {
        self.agent
            .get(&self.url(path))
            .set("Authorization", &self.auth)
            .set("Accept", "application/json")
    }

    fn send(&self, method: &str, path: &str, body: Value) -> Result<Value, TransportError> {
        let response = self
            .agent
            .request(method, &self.url(path))
            .set("Authorization", &self.auth)
            .set("Accept", "application/json")
            .send_json(body)
            .map_err(transport)?;
        if response.status() == 204 {
            return Ok(Value::Null);
        }
        response.into_json().map_err(decode)
    }

    fn fetch(&self, id: &PageId) -> Result<Content, TransportError> {
        self.get(&format!("content/{id}"))
            .query("expand", "version,ancestors")
            .call()
            .map_err(transport)?
            .into_json()
            .map_err(decode)
    }

    fn next_version(&self, id: &PageId) -> Result<u64, TransportError> {
        let current = self.fetch(id)?;
        Ok(current.version.map_or(1, |v| v.number) + 1)
    }
}

fn storage(body: &str) -> Value {
    json!({ "storage": { "value": body, "representation": "storage" } })
}

fn ancestors(parent: Option<&PageId>) -> Value {
    match parent {
        Some(id) => json!([{ "id": id.0 }]),
        None => json!([]),
    }
}

impl RemoteSpaceClient for ConfluenceClient {
    fn find_page_by_title(
        &mut self,
        title: &str,
        parent: Option<&PageId>,
    ) -> Result<Option<PageId>, TransportError> {
        let found: ContentArray = self
            .get("content")
            .query("spaceKey", &self.space)
            .query("title", title)
            .query("type", "page")
            .query("expand", "ancestors")
            .call()
            .map_err(transport)?
            .into_json()
            .map_err(decode)?;
        Ok(found
            .results
            .into_iter()
            .find(|c| c.ancestors.last().map(|a| a.id.as_str()) == parent.map(|p| p.0.as_str()))
            .map(|c| PageId(c.id)))
    }

    fn create_page(
        &mut self,
        title: &str,
        parent: Option<&PageId>,
        body: &str,
    ) -> Result<PageId, TransportError> {
        let created = self.send(
            "POST",
            "content",
            json!({
                "type": "page",
                "title": title,
                "space": { "key": self.space },
                "ancestors": ancestors(parent),
                "body": storage(body),
            }),
        )?;
        let content: ContentRef =
            serde_json::from_value(created).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(PageId(content.id))
    }

    fn update_page(&mut self, id: &PageId, title: &str, body: &str) -> Result<(), TransportError> {
        let version = self.next_version(id)?;
        self.send(
            "PUT",
            &format!("content/{id}"),
            json!({
                "id": id.0,
                "type": "page",
                "title": title,
                "version": { "number": version },
                "body": storage(body),
            }),
        )?;
        Ok(())
    }

    fn move_page(
        &mut self,
        id: &PageId,
        new_parent: Option<&PageId>,
        new_title: &str,
    ) -> Result<(), TransportError> {
        let current = self.fetch(id)?;
        let version = current.version.map_or(1, |v| v.number) + 1;
        self.send(
            "PUT",
            &format!("content/{}", current.id),
            json!({
                "id": id.0,
                "type": "page",
                "title": new_title,
                "version": { "number": version },
                "ancestors": ancestors(new_parent),
            }),
        )?;
        Ok(())
    }

    fn delete_page(&mut self, id: &PageId) -> Result<(), TransportError> {
        self.agent
            .delete(&self.url(&format!("content/{id}")))
            .set("Authorization", &self.auth)
            .call()
            .map_err(transport)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header_encodes_user_and_key() {
        let client = ConfluenceClient::new(ConfluenceSettings {
            api_url: "https://example.atlassian.net/wiki/rest/api/".into(),
            user: "me@example.com".into(),
            key: "secret".into(),
            space: "DOCS".into(),
        });
        assert_eq!(client.auth, "Basic bWVAZXhhbXBsZS5jb206c2VjcmV0");
        assert_eq!(client.url("content"), "https://example.atlassian.net/wiki/rest/api/content");
    }

    #[test]
    fn top_level_pages_have_no_ancestors() {
        assert_eq!(ancestors(None), json!([]));
        assert_eq!(ancestors(Some(&PageId::from("42"))), json!([{ "id": "42" }]));
    }
}
