/// Thin REST clients for the two external services the provisioner
/// coordinates with besides Docker and the gateway. Both are
/// best-effort idempotent: creating a record that already exists, or
/// deleting one that's already gone, succeeds.
pub struct DnsProviderClient {
  http: reqwest::Client,
  base_url: String,
  api_token: String,
}

impl DnsProviderClient {
  pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
    DnsProviderClient {
      http: reqwest::Client::new(),
      base_url: base_url.into(),
      api_token: api_token.into(),
    }
  }

  pub async fn upsert_record(
    &self,
    domain: &str,
    target: &str,
  ) -> anyhow::Result<()> {
    let response = self
      .http
      .put(format!("{}/records/{domain}", self.base_url))
      .bearer_auth(&self.api_token)
      .json(&serde_json::json!({ "type": "CNAME", "content": target }))
      .send()
      .await?;
    response.error_for_status()?;
    Ok(())
  }

  pub async fn delete_record(&self, domain: &str) -> anyhow::Result<()> {
    let response = self
      .http
      .delete(format!("{}/records/{domain}", self.base_url))
      .bearer_auth(&self.api_token)
      .send()
      .await?;
    match response.error_for_status() {
      Ok(_) => Ok(()),
      Err(err) if err.status() == Some(reqwest::StatusCode::NOT_FOUND) => Ok(()),
      Err(err) => Err(err.into()),
    }
  }
}

pub struct TunnelProviderClient {
  http: reqwest::Client,
  base_url: String,
  api_token: String,
  tunnel_id: String,
}

impl TunnelProviderClient {
  pub fn new(
    base_url: impl Into<String>,
    api_token: impl Into<String>,
    tunnel_id: impl Into<String>,
  ) -> Self {
    TunnelProviderClient {
      http: reqwest::Client::new(),
      base_url: base_url.into(),
      api_token: api_token.into(),
      tunnel_id: tunnel_id.into(),
    }
  }

  pub async fn register_hostname(
    &self,
    hostname: &str,
    service: &str,
  ) -> anyhow::Result<()> {
    let response = self
      .http
      .put(format!(
        "{}/tunnels/{}/ingress/{hostname}",
        self.base_url, self.tunnel_id
      ))
      .bearer_auth(&self.api_token)
      .json(&serde_json::json!({ "service": service }))
      .send()
      .await?;
    response.error_for_status()?;
    Ok(())
  }

  pub async fn unregister_hostname(&self, hostname: &str) -> anyhow::Result<()> {
    let response = self
      .http
      .delete(format!(
        "{}/tunnels/{}/ingress/{hostname}",
        self.base_url, self.tunnel_id
      ))
      .bearer_auth(&self.api_token)
      .send()
      .await?;
    match response.error_for_status() {
      Ok(_) => Ok(()),
      Err(err) if err.status() == Some(reqwest::StatusCode::NOT_FOUND) => Ok(()),
      Err(err) => Err(err.into()),
    }
  }
}

pub struct UptimeMonitorClient {
  http: reqwest::Client,
  base_url: String,
  api_token: String,
}

impl UptimeMonitorClient {
  pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
    UptimeMonitorClient {
      http: reqwest::Client::new(),
      base_url: base_url.into(),
      api_token: api_token.into(),
    }
  }

  pub async fn create_monitor(&self, name: &str, url: &str) -> anyhow::Result<()> {
    let response = self
      .http
      .post(format!("{}/monitors", self.base_url))
      .bearer_auth(&self.api_token)
      .json(&serde_json::json!({ "name": name, "url": url, "type": "http" }))
      .send()
      .await?;
    response.error_for_status()?;
    Ok(())
  }

  pub async fn delete_monitor(&self, name: &str) -> anyhow::Result<()> {
    let response = self
      .http
      .delete(format!("{}/monitors/{name}", self.base_url))
      .bearer_auth(&self.api_token)
      .send()
      .await?;
    match response.error_for_status() {
      Ok(_) => Ok(()),
      Err(err) if err.status() == Some(reqwest::StatusCode::NOT_FOUND) => Ok(()),
      Err(err) => Err(err.into()),
    }
  }
}
