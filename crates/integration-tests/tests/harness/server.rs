//! Test server wrapper that starts imagebatch on a random port

use std::net::SocketAddr;

use imagebatch_config::Config;
use imagebatch_server::Server;
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a test server with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let server = Server::new(&config)?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Submit a batch, returning the raw response
    pub async fn create_batch(&self, requests: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/v1/images/batches"))
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await
            .expect("create batch request")
    }

    /// Submit a batch that is expected to be accepted, returning its job id
    pub async fn create_job(&self, requests: serde_json::Value) -> String {
        let resp = self.create_batch(requests).await;
        assert_eq!(resp.status(), 202, "batch creation was not accepted");

        let body: serde_json::Value = resp.json().await.expect("job id body");
        body["job_id"].as_str().expect("job_id string").to_owned()
    }

    /// Poll a job, returning the status code and JSON body
    pub async fn poll(&self, job_id: &str) -> (u16, serde_json::Value) {
        let resp = self
            .client
            .get(self.url(&format!("/v1/images/batches/{job_id}")))
            .send()
            .await
            .expect("status request");

        let status = resp.status().as_u16();
        (status, resp.json().await.expect("status body"))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
