use super::http::{DirectHttp, HttpClient};
use super::shell::RemoteShell;
use super::shell_http::ShellHttp;
use super::shell_tool::ShellTool;
use super::{Payload, Retrieve};
use crate::data::{Endpoint, Transport};
use crate::error::TransportError;

/// One client per transport, selected by the endpoint's [`Transport`] tag.
pub struct Retrievers<H, S: RemoteShell + 'static> {
    pub http: DirectHttp<H>,
    pub shell_http: ShellHttp<std::sync::Arc<S>>,
    pub shell_tool: ShellTool<S>,
}

impl<H: HttpClient, S: RemoteShell + 'static> Retrieve for Retrievers<H, S> {
    async fn attempt(&self, endpoint: &Endpoint, locator: &str) -> Result<Payload, TransportError> {
        match endpoint.transport {
            Transport::Http => self.http.attempt(endpoint, locator).await,
            Transport::RemoteShellHttp => self.shell_http.attempt(endpoint, locator).await,
            Transport::RemoteShellTool => self.shell_tool.attempt(endpoint, locator).await,
        }
    }
}
