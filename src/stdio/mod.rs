// Line protocol over stdin/stdout
// One JSON request per input line, one JSON reply per output line


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::assistant::CourseAssistant;
use crate::config::Config;
use crate::provider::{ChatModel, Embedder};
use crate::{ErrorKind, Result};

/// Written once the pipeline can take questions.
pub const READY_LINE: &str = "RAG_READY";

/// Serializes as `{"response": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Response(String),
    Error(String),
}

impl From<Result<String>> for Reply {
    #[inline]
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(response) => Self::Response(response),
            Err(e) => {
                if e.kind() == ErrorKind::Validation {
                    warn!("Rejected question: {}", e);
                } else {
                    error!("Question failed: {}", e);
                }
                Self::Error(e.public_message())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LineRequest {
    #[serde(default)]
    message: Option<String>,
}

/// Build the pipeline, then answer questions from stdin until EOF.
#[inline]
pub async fn serve_stdio(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
) -> Result<()> {
    let assistant = CourseAssistant::initialize(config, embedder, chat).await?;
    serve_lines(&assistant, BufReader::new(io::stdin()), io::stdout()).await
}

/// Write [`READY_LINE`], then exactly one reply per input line.
///
/// Bad or blank lines get an error reply and the loop keeps going; only I/O
/// failures end it early.
#[inline]
pub async fn serve_lines<R, W>(assistant: &CourseAssistant, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_line(&mut writer, READY_LINE).await?;
    info!("Line protocol ready");

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let reply = answer_line(assistant, line.trim()).await;
        let json = serde_json::to_string(&reply).map_err(anyhow::Error::from)?;
        write_line(&mut writer, &json).await?;
    }

    info!("EOF reached, closing line protocol");
    Ok(())
}

/// Parse one request line and run it through the pipeline.
#[inline]
pub async fn answer_line(assistant: &CourseAssistant, line: &str) -> Reply {
    let request: LineRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Failed to parse request line: {}", e);
            return Reply::Error(format!("Invalid JSON: {}", e));
        }
    };

    let message = request.message.unwrap_or_default();
    assistant.query(&message).await.into()
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
