// Poll variant file operations
//
// Uploads are never retried here: the transfer manager owns the checksum
// retry decision because only it knows the payload size threshold.

use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;
use crate::poll::client::{ErrResponse, PollClient};
use crate::progress::ProgressFn;
use crate::transport::{Deadline, Request, decode_json};
use crate::types::{FileEntry, FileInfo, format_timestamp};

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileEntry>,
    #[serde(default)]
    next: u64,
    #[serde(default)]
    err: i64,
}

#[derive(Debug, Deserialize)]
struct FileInfoResponse {
    #[serde(default)]
    err: i64,
    #[serde(flatten)]
    info: FileInfo,
}

impl PollClient {
    /// Upload `content` to `path`.
    ///
    /// A non-zero `err` (checksum mismatch or write failure) surfaces as
    /// `OperationFailed`.
    pub async fn upload(
        &self,
        path: &str,
        content: Bytes,
        modified: Option<NaiveDateTime>,
        crc32: Option<u32>,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<(), Error> {
        debug!(path, bytes = content.len(), crc32, "uploading");
        let mut req = Request::post("/rr_upload").query("name", path);
        if let Some(time) = modified {
            req = req.query("time", format_timestamp(time));
        }
        if let Some(crc) = crc32 {
            req = req.query("crc32", format!("{crc:08x}"));
        }
        let req = req
            .body(content, "application/octet-stream")
            .file(path)
            .deadline(Deadline::Unbounded)
            .no_retry()
            .cancel(cancel)
            .progress(progress);

        let resp: ErrResponse = decode_json(&self.send(req).await?)?;
        if resp.err != 0 {
            return Err(Error::OperationFailed {
                reason: format!("upload of {path} failed (err {})", resp.err),
            });
        }
        Ok(())
    }

    pub async fn download(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
        progress: Option<ProgressFn>,
    ) -> Result<Bytes, Error> {
        debug!(path, "downloading");
        let req = Request::get("/rr_download")
            .query("name", path)
            .file(path)
            .deadline(Deadline::Unbounded)
            .cancel(cancel)
            .progress(progress);
        self.send(req).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let req = Request::get("/rr_delete").query("name", path).file(path);
        let resp: ErrResponse = decode_json(&self.send(req).await?)?;
        if resp.err != 0 {
            return Err(Error::OperationFailed {
                reason: format!("could not delete {path}"),
            });
        }
        Ok(())
    }

    /// Move or rename a file. A missing source surfaces as `FileNotFound`.
    pub async fn move_file(&self, from: &str, to: &str, overwrite: bool) -> Result<(), Error> {
        let req = Request::get("/rr_move")
            .query("old", from)
            .query("new", to)
            .query("deleteexisting", if overwrite { "yes" } else { "no" })
            .file(from);
        let resp: ErrResponse = decode_json(&self.send(req).await?)?;
        match resp.err {
            0 => Ok(()),
            1 => Err(Error::FileNotFound { path: from.into() }),
            code => Err(Error::OperationFailed {
                reason: format!("could not move {from} to {to} (err {code})"),
            }),
        }
    }

    pub async fn make_directory(&self, path: &str) -> Result<(), Error> {
        let req = Request::get("/rr_mkdir").query("dir", path);
        let resp: ErrResponse = decode_json(&self.send(req).await?)?;
        if resp.err != 0 {
            return Err(Error::OperationFailed {
                reason: format!("could not create directory {path}"),
            });
        }
        Ok(())
    }

    /// List a directory, following pagination until exhausted.
    pub async fn list_files(&self, dir: &str) -> Result<Vec<FileEntry>, Error> {
        let mut files = Vec::new();
        let mut first = 0;
        loop {
            let req = Request::get("/rr_filelist")
                .query("dir", dir)
                .query("first", first.to_string())
                .directory(dir);
            let page: FileListResponse = decode_json(&self.send(req).await?)?;
            match page.err {
                0 => {}
                1 => return Err(Error::DriveUnmounted { path: dir.into() }),
                2 => return Err(Error::DirectoryNotFound { path: dir.into() }),
                code => {
                    return Err(Error::OperationFailed {
                        reason: format!("could not list {dir} (err {code})"),
                    });
                }
            }
            files.extend(page.files);
            if page.next == 0 || page.next <= first {
                return Ok(files);
            }
            first = page.next;
        }
    }

    pub async fn file_info(&self, path: &str) -> Result<FileInfo, Error> {
        let req = Request::get("/rr_fileinfo").query("name", path).file(path);
        let resp: FileInfoResponse = decode_json(&self.send(req).await?)?;
        if resp.err != 0 {
            return Err(Error::FileNotFound { path: path.into() });
        }
        let mut info = resp.info;
        info.file_name.get_or_insert_with(|| path.to_owned());
        Ok(info)
    }
}
