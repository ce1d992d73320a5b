//! Request bodies as the transport sees them.
//!
//! File bodies are streamed in chunks from disk, starting at a resume offset
//! and optionally framed by multipart prefix/suffix bytes.

use crate::upload::ProgressReporter;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const CHUNK_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub enum PreparedBody {
    #[default]
    Empty,
    Bytes(Bytes),
    File(FileBody),
}

impl PreparedBody {
    /// Exact number of bytes that will go on the wire.
    pub fn content_length(&self) -> u64 {
        match self {
            PreparedBody::Empty => 0,
            PreparedBody::Bytes(b) => b.len() as u64,
            PreparedBody::File(f) => f.content_length(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_length() == 0
    }

    /// Stream the body. Cheap for in-memory bodies.
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        match self {
            PreparedBody::Empty => stream::empty().boxed(),
            PreparedBody::Bytes(b) => stream::once(async move { Ok(b) }).boxed(),
            PreparedBody::File(f) => f.into_stream(),
        }
    }
}

/// A file streamed from `offset` to its end.
#[derive(Debug, Clone)]
pub struct FileBody {
    pub path: PathBuf,
    pub offset: u64,
    pub file_len: u64,
    pub prefix: Bytes,
    pub suffix: Bytes,
    pub progress: Option<Arc<ProgressReporter>>,
}

impl FileBody {
    pub fn new(path: impl Into<PathBuf>, offset: u64, file_len: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            file_len,
            prefix: Bytes::new(),
            suffix: Bytes::new(),
            progress: None,
        }
    }

    /// Number of file bytes sent, excluding framing.
    pub fn file_bytes(&self) -> u64 {
        self.file_len.saturating_sub(self.offset)
    }

    pub fn content_length(&self) -> u64 {
        self.prefix.len() as u64 + self.file_bytes() + self.suffix.len() as u64
    }

    fn report(&self, sent: u64) {
        if let Some(progress) = &self.progress {
            progress.report(self.offset + sent, self.file_len);
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        let state = StreamState {
            stage: Stage::Prefix,
            sent: 0,
            body: self,
        };
        stream::unfold(state, |mut st| async move {
            loop {
                match std::mem::replace(&mut st.stage, Stage::Done) {
                    Stage::Prefix => {
                        st.stage = Stage::Open;
                        if !st.body.prefix.is_empty() {
                            let prefix = st.body.prefix.clone();
                            return Some((Ok(prefix), st));
                        }
                    }
                    Stage::Open => match open_at(&st.body).await {
                        Ok(file) => {
                            st.body.report(0);
                            st.stage = Stage::Read(file, st.body.file_bytes());
                        }
                        Err(e) => return Some((Err(e), st)),
                    },
                    Stage::Read(mut file, remaining) => {
                        if remaining == 0 {
                            st.stage = Stage::Suffix;
                            continue;
                        }
                        let mut buf = vec![0u8; remaining.min(CHUNK_SIZE) as usize];
                        match file.read(&mut buf).await {
                            Ok(0) => {
                                let err = io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    "file truncated during upload",
                                );
                                return Some((Err(err), st));
                            }
                            Ok(n) => {
                                buf.truncate(n);
                                st.sent += n as u64;
                                st.body.report(st.sent);
                                st.stage = Stage::Read(file, remaining - n as u64);
                                return Some((Ok(Bytes::from(buf)), st));
                            }
                            Err(e) => return Some((Err(e), st)),
                        }
                    }
                    Stage::Suffix => {
                        if !st.body.suffix.is_empty() {
                            let suffix = st.body.suffix.clone();
                            return Some((Ok(suffix), st));
                        }
                    }
                    Stage::Done => return None,
                }
            }
        })
        .boxed()
    }
}

enum Stage {
    Prefix,
    Open,
    Read(File, u64),
    Suffix,
    Done,
}

struct StreamState {
    stage: Stage,
    sent: u64,
    body: FileBody,
}

async fn open_at(body: &FileBody) -> io::Result<File> {
    let mut file = File::open(&body.path).await?;
    if body.offset > 0 {
        file.seek(SeekFrom::Start(body.offset)).await?;
    }
    Ok(file)
}
