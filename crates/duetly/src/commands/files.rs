//! File commands: upload, download, ls, info, rm, mv, mkdir.

use std::fmt::Write;
use std::path::Path;

use bytes::Bytes;
use bytesize::ByteSize;
use chrono::{DateTime, Local, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::Tabled;

use duetly_core::{Connector, FileEntry, FileInfo, FileTransferItem, ProgressFn, TransferProgress};

use crate::cli::{
    DownloadArgs, GlobalOpts, InfoArgs, LsArgs, MkdirArgs, MvArgs, RmArgs, UploadArgs,
};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

// ── Progress ─────────────────────────────────────────────────────────

fn progress_bar(label: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg:30!} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec}",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(label.to_owned());
    bar
}

fn progress_fn(bar: &ProgressBar) -> ProgressFn {
    let bar = bar.clone();
    ProgressFn::new(move |p: TransferProgress| {
        if let Some(total) = p.total {
            bar.set_length(total);
        }
        bar.set_position(p.transferred);
    })
}

fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

// ── Transfers ────────────────────────────────────────────────────────

/// Files go up one at a time so each keeps its local modification time.
pub async fn upload(
    args: UploadArgs,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    for file in &args.files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CliError::Validation {
                field: "file".into(),
                reason: format!("'{}' has no usable file name", file.display()),
            })?;
        let remote = util::join_remote(&args.dest, name);
        let content = Bytes::from(tokio::fs::read(file).await?);

        let bar = progress_bar(name, global.quiet);
        bar.set_length(u64::try_from(content.len()).unwrap_or(u64::MAX));
        connector
            .upload(
                &remote,
                content,
                modified_time(file),
                None,
                Some(progress_fn(&bar)),
            )
            .await?;
        bar.finish_and_clear();
        if !global.quiet {
            eprintln!("✓ {} → {remote}", file.display());
        }
    }
    Ok(())
}

pub async fn download(
    args: DownloadArgs,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let items = args
        .paths
        .iter()
        .map(FileTransferItem::download)
        .collect::<Vec<_>>();

    let bar = progress_bar(&format!("{} file(s)", items.len()), global.quiet);
    let done = connector
        .download_batch(items, None, Some(progress_fn(&bar)))
        .await?;
    bar.finish_and_clear();

    tokio::fs::create_dir_all(&args.dest).await?;
    for item in done {
        let target = args.dest.join(util::remote_file_name(&item.path));
        let content = item.payload.unwrap_or_default();
        tokio::fs::write(&target, &content).await?;
        if !global.quiet {
            eprintln!(
                "✓ {} → {} ({})",
                item.path,
                target.display(),
                ByteSize::b(u64::try_from(content.len()).unwrap_or(0))
            );
        }
    }
    Ok(())
}

// ── Listing ──────────────────────────────────────────────────────────

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "Type")]
    kind: &'static str,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

impl From<&FileEntry> for FileRow {
    fn from(entry: &FileEntry) -> Self {
        Self {
            kind: if entry.is_directory() { "dir" } else { "file" },
            name: entry.name.clone(),
            size: if entry.is_directory() {
                String::new()
            } else {
                ByteSize::b(entry.size).to_string()
            },
            modified: entry
                .modified()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
        }
    }
}

pub async fn list(
    args: LsArgs,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut entries = connector.list_files(&args.dir).await?;
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.cmp(&b.name))
    });
    let out = output::render_list(
        &global.output,
        &entries,
        |e| FileRow::from(e),
        |e| e.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Serialize)]
struct InfoView<'a> {
    path: &'a str,
    #[serde(flatten)]
    info: &'a FileInfo,
}

fn info_detail(view: &InfoView<'_>) -> String {
    let info = view.info;
    let mut out = String::new();
    let _ = writeln!(out, "File:          {}", view.path);
    let _ = writeln!(out, "Size:          {}", ByteSize::b(info.size));
    if let Some(ref slicer) = info.generated_by {
        let _ = writeln!(out, "Generated by:  {slicer}");
    }
    let _ = writeln!(out, "Height:        {:.2} mm", info.height);
    let _ = writeln!(out, "Layer height:  {:.2} mm", info.layer_height);
    let _ = writeln!(out, "Layers:        {}", info.num_layers);
    if !info.filament.is_empty() {
        let filament: Vec<String> = info.filament.iter().map(|f| format!("{f:.1}")).collect();
        let _ = writeln!(out, "Filament:      {} mm", filament.join(" / "));
    }
    if let Some(secs) = info.print_time {
        let duration = std::time::Duration::from_secs(secs);
        let _ = writeln!(out, "Print time:    {}", humantime::format_duration(duration));
    }
    out.trim_end().to_owned()
}

pub async fn info(
    args: InfoArgs,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let info = connector.file_info(&args.path).await?;
    let view = InfoView {
        path: &args.path,
        info: &info,
    };
    let out = output::render_single(&global.output, &view, info_detail, |v| v.path.to_owned())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Mutations ────────────────────────────────────────────────────────

pub async fn remove(
    args: RmArgs,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !util::confirm(&format!("Delete {}?", args.path), "rm", global.yes)? {
        return Ok(());
    }
    connector.delete(&args.path).await?;
    if !global.quiet {
        eprintln!("✓ Deleted {}", args.path);
    }
    Ok(())
}

pub async fn rename(
    args: MvArgs,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    connector.move_file(&args.from, &args.to, args.force).await?;
    if !global.quiet {
        eprintln!("✓ {} → {}", args.from, args.to);
    }
    Ok(())
}

pub async fn mkdir(
    args: MkdirArgs,
    connector: &Connector,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    connector.make_directory(&args.path).await?;
    if !global.quiet {
        eprintln!("✓ Created {}", args.path);
    }
    Ok(())
}
