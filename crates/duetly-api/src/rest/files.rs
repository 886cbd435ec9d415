// REST variant file operations

use bytes::Bytes;
use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;
use crate::progress::ProgressFn;
use crate::rest::client::{RestClient, encode_path};
use crate::transport::{Deadline, Request, decode_json};
use crate::types::{FileEntry, FileInfo, format_timestamp};

impl RestClient {
    /// Upload `content` to `path`.
    ///
    /// The board computer writes through its own filesystem, so no checksum
    /// is exchanged on this variant.
    pub async fn upload(
        &self,
        path: &str,
        content: Bytes,
        modified: Option<NaiveDateTime>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<(), Error> {
        debug!(path, bytes = content.len(), "uploading");
        let mut req = Request::put(format!("/machine/file/{}", encode_path(path)));
        if let Some(time) = modified {
            req = req.query("timeModified", format_timestamp(time));
        }
        let req = req
            .body(content, "application/octet-stream")
            .file(path)
            .deadline(Deadline::Unbounded)
            .no_retry()
            .cancel(cancel)
            .progress(progress);
        self.send(req).await.map(|_| ())
    }

    pub async fn download(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Bytes, Error> {
        debug!(path, "downloading");
        let req = Request::get(format!("/machine/file/{}", encode_path(path)))
            .file(path)
            .deadline(Deadline::Unbounded)
            .cancel(cancel)
            .progress(progress);
        self.send(req).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let req = Request::delete(format!("/machine/file/{}", encode_path(path))).file(path);
        self.send(req).await.map(|_| ())
    }

    pub async fn move_file(&self, from: &str, to: &str, overwrite: bool) -> Result<(), Error> {
        let req = Request::post("/machine/file/move")
            .form(vec![
                ("from".into(), from.into()),
                ("to".into(), to.into()),
                ("force".into(), overwrite.to_string()),
            ])
            .file(from);
        self.send(req).await.map(|_| ())
    }

    pub async fn make_directory(&self, path: &str) -> Result<(), Error> {
        let req = Request::put(format!("/machine/directory/{}", encode_path(path)));
        self.send(req).await.map(|_| ())
    }

    pub async fn list_files(&self, dir: &str) -> Result<Vec<FileEntry>, Error> {
        let req = Request::get(format!("/machine/directory/{}", encode_path(dir))).directory(dir);
        decode_json(&self.send(req).await?)
    }

    pub async fn file_info(&self, path: &str) -> Result<FileInfo, Error> {
        let req = Request::get(format!("/machine/fileinfo/{}", encode_path(path))).file(path);
        let mut info: FileInfo = decode_json(&self.send(req).await?)?;
        info.file_name.get_or_insert_with(|| path.to_owned());
        Ok(info)
    }
}
