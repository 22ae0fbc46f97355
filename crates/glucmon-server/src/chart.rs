//! Client for the external plotting service.
//!
//! The service renders a chart for a time range, writes the image into the
//! shared file store and answers with the file's id and name. Callers read
//! the bytes back with [`take_rendered_file`], which also deletes the file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glucmon_notify::message::Attachment;
use glucmon_storage::FileStore;
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

const PLOT_DAILY_PATH: &str = "/plotter.Plotter/PlotDaily";
const PLOT_WEEKLY_PATH: &str = "/plotter.Plotter/PlotWeekly";

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Chart: invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Chart: service unavailable: {0}")]
    Unavailable(String),

    #[error("Chart: render failed: {0}")]
    Status(#[from] tonic::Status),
}

/// Reference to a file written by the plotting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRef {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Glucose chart of a short window, with doses and intakes marked.
    async fn plot_daily(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RenderedRef, ChartError>;

    /// Overlaid per-day curves for a report window.
    async fn plot_weekly(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RenderedRef, ChartError>;
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeRange {
    #[prost(message, optional, tag = "1")]
    pub start: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub end: Option<prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileResponse {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
}

fn timestamp(t: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    }
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(timestamp(start)),
            end: Some(timestamp(end)),
        }
    }
}

/// gRPC client for the plotting service. Connects lazily.
#[derive(Clone)]
pub struct GrpcChartRenderer {
    grpc: tonic::client::Grpc<Channel>,
}

impl GrpcChartRenderer {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ChartError> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| ChartError::InvalidEndpoint(e.to_string()))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect_lazy();
        Ok(Self {
            grpc: tonic::client::Grpc::new(channel),
        })
    }

    async fn call(&self, path: &'static str, range: TimeRange) -> Result<RenderedRef, ChartError> {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| ChartError::Unavailable(e.to_string()))?;
        let codec: ProstCodec<TimeRange, FileResponse> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(range),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?
            .into_inner();
        tracing::debug!(path, id = %response.id, name = %response.name, "Chart rendered");
        Ok(RenderedRef {
            id: response.id,
            name: response.name,
        })
    }
}

#[async_trait]
impl ChartRenderer for GrpcChartRenderer {
    async fn plot_daily(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RenderedRef, ChartError> {
        self.call(PLOT_DAILY_PATH, TimeRange::new(start, end)).await
    }

    async fn plot_weekly(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RenderedRef, ChartError> {
        self.call(PLOT_WEEKLY_PATH, TimeRange::new(start, end)).await
    }
}

/// Reads a rendered file as an attachment and deletes it from the store.
///
/// The file is deleted even when the read fails. Failures only drop the image.
pub async fn take_rendered_file<S>(files: &S, rendered: &RenderedRef) -> Option<Attachment>
where
    S: FileStore + ?Sized,
{
    let file = match files.read_file(&rendered.id).await {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(file_id = %rendered.id, error = %e, "Unable to read rendered chart");
            None
        }
    };
    if let Err(e) = files.delete_file(&rendered.id).await {
        tracing::warn!(file_id = %rendered.id, error = %e, "Unable to delete rendered chart");
    }
    file.map(|f| Attachment {
        name: if rendered.name.is_empty() { f.name } else { rendered.name.clone() },
        data: f.data,
    })
}

/// Renders through `render` and fetches the image, or `None` when any step fails.
pub async fn render_attachment<S, F, Fut>(files: &S, render: F) -> Option<Attachment>
where
    S: FileStore + ?Sized,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<RenderedRef, ChartError>>,
{
    match render().await {
        Ok(rendered) => take_rendered_file(files, &rendered).await,
        Err(e) => {
            tracing::warn!(error = %e, "Chart rendering failed, continuing without image");
            None
        }
    }
}
