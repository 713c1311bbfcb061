use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracery::storage::{KeyValueStore, MemoryStore};
use tracery::{AuthorizedTransport, Session, TraceryClient};
use wiremock::matchers::{method, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Deserialize)]
pub struct Fixture {
    #[serde(rename = "_meta")]
    pub meta: Option<FixtureMeta>,
    pub request: FixtureRequest,
    pub response: FixtureResponse,
}

#[derive(Deserialize)]
pub struct FixtureMeta {
    pub query: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
pub struct FixtureRequest {
    pub method: String,
    pub path_pattern: String,
}

#[derive(Deserialize)]
pub struct FixtureResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

pub struct TraceryMock {
    pub server: MockServer,
}

impl TraceryMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    pub fn load_fixture(fixture_set: &str, fixture_path: &str) -> Fixture {
        let full_path = Self::fixtures_dir().join(fixture_set).join(fixture_path);

        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));

        serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e))
    }

    /// Builds a mock for a fixture of the `min` set without mounting it, so
    /// callers can attach expectations first.
    pub fn fixture_mock(fixture_path: &str) -> Mock {
        let fixture = Self::load_fixture("min", fixture_path);

        let mut builder = Mock::given(method(fixture.request.method.as_str()))
            .and(path_regex(&fixture.request.path_pattern));

        if let Some(query) = fixture.meta.and_then(|meta| meta.query) {
            for (key, value) in query {
                builder = builder.and(query_param(key, value));
            }
        }

        builder.respond_with(
            ResponseTemplate::new(fixture.response.status_code)
                .set_body_json(&fixture.response.body),
        )
    }

    #[allow(dead_code)]
    pub async fn mount_fixture(&self, fixture_path: &str) {
        Self::fixture_mock(fixture_path).mount(&self.server).await;
    }

    pub fn base_url(&self) -> String {
        format!("{}/api", self.server.uri())
    }

    pub fn transport(&self) -> Arc<AuthorizedTransport> {
        Arc::new(AuthorizedTransport::new(self.base_url(), Duration::from_secs(1)).unwrap())
    }

    #[allow(dead_code)]
    pub fn client(&self) -> TraceryClient {
        TraceryClient::new(self.transport())
    }

    #[allow(dead_code)]
    pub fn session(&self) -> Session {
        self.session_with(Arc::new(MemoryStore::new()))
    }

    #[allow(dead_code)]
    pub fn session_with(&self, storage: Arc<dyn KeyValueStore>) -> Session {
        Session::open(self.transport(), storage).unwrap()
    }

    /// A session that already holds `token`.
    #[allow(dead_code)]
    pub fn logged_in_session(&self, token: &str) -> Session {
        let session = self.session();
        session
            .credentials()
            .set(Some(token.to_string()))
            .unwrap();
        session
    }
}
