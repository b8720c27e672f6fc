// ==========================================
// 销售库存ETL系统 - 审计日志汇
// ==========================================
// 职责: 追加写每日 CSV 审计文件 (timestamp, event_kind, source, message)
// 约定: 只追加不改写;写入失败仅告警,绝不向管道抛出
// ==========================================

use chrono::Local;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::warn;

/// 审计事件类型
///
/// 前七种是清洗阶段的行级拒绝口径,其余为运行事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // ===== 行级拒绝 =====
    Structure,
    Format,
    ForbiddenValue,
    Duplicate,
    DuplicateInStore,
    StrictDuplicate,
    ForeignKey,

    // ===== 运行事件 =====
    FileRead,
    FileReadError,
    SourceQuery,
    SourceQueryError,
    Extract,
    Rename,
    Transform,
    Load,
    InsertError,
    Watermark,
    PostLoad,
    Fatal,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Structure => "structure",
            EventKind::Format => "format",
            EventKind::ForbiddenValue => "forbidden_value",
            EventKind::Duplicate => "duplicate",
            EventKind::DuplicateInStore => "duplicate_in_store",
            EventKind::StrictDuplicate => "strict_duplicate",
            EventKind::ForeignKey => "foreign_key",
            EventKind::FileRead => "file_read",
            EventKind::FileReadError => "file_read_error",
            EventKind::SourceQuery => "source_query",
            EventKind::SourceQueryError => "source_query_error",
            EventKind::Extract => "extract",
            EventKind::Rename => "rename",
            EventKind::Transform => "transform",
            EventKind::Load => "load",
            EventKind::InsertError => "insert_error",
            EventKind::Watermark => "watermark",
            EventKind::PostLoad => "post_load",
            EventKind::Fatal => "fatal",
        }
    }
}

// ==========================================
// AuditLog - 追加写审计汇
// ==========================================
#[derive(Debug, Clone)]
pub struct AuditLog {
    state_dir: PathBuf,
}

impl AuditLog {
    pub fn new<P: AsRef<Path>>(state_dir: P) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    /// 当日审计文件路径 log_etl_YYYY-MM-DD.csv
    pub fn current_file(&self) -> PathBuf {
        let date = Local::now().format("%Y-%m-%d");
        self.state_dir.join(format!("log_etl_{}.csv", date))
    }

    /// 追加一条审计记录（即发即忘）
    pub fn record(&self, kind: EventKind, source: &str, message: &str) {
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        if let Err(e) = self.append(&ts, kind.as_str(), source, message) {
            // 审计汇不可用不能拖垮管道
            warn!(error = %e, kind = kind.as_str(), source = source, "审计日志写入失败");
        }
    }

    fn append(
        &self,
        ts: &str,
        kind: &str,
        source: &str,
        message: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&self.state_dir)?;
        let path = self.current_file();
        let write_header = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(["timestamp", "event_kind", "source", "message"])?;
        }
        writer.write_record([ts, kind, source, message])?;
        writer.flush()?;
        Ok(())
    }
}
