// ==========================================
// 销售库存ETL系统 - 收件文件分支
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 约定: 解析成败与否,文件一律移入归档目录,绝不二次处理
// ==========================================

use calamine::{open_workbook, Reader, Xlsx};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::audit::{AuditLog, EventKind};
use crate::domain::{Provenance, Record, SourceBatch, Value};
use crate::error::{EtlError, EtlResult};
use crate::schema::{normalize_header, SchemaRegistry};

/// 收件目录中的待处理文件（扩展名过滤,目录缺失视为空）
fn pending_files(inbox_dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(inbox_dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            let ext = p
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            matches!(ext.as_str(), "csv" | "xlsx" | "xls")
        })
        .collect();
    // 处理顺序对来源稳定
    files.sort();
    files
}

/// 文件移入归档目录（同名覆盖,与来源目录解耦）
fn archive_file(src: &Path, archive_dir: &Path) -> EtlResult<()> {
    fs::create_dir_all(archive_dir)?;
    let file_name = src
        .file_name()
        .ok_or_else(|| EtlError::FileNotFound(src.display().to_string()))?;
    let dest = archive_dir.join(file_name);
    fs::rename(src, &dest).map_err(|e| EtlError::ArchiveError {
        file: src.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// 抽取收件目录全部待处理文件,拼为单一订单行批次
///
/// 每行打上 (文件名, 1 起始行号) 溯源标签;
/// 列名先规范化(去重音/小写/下划线)再过同义词字典。
pub fn extract_from_inbox(
    inbox_dir: &Path,
    archive_dir: &Path,
    registry: &SchemaRegistry,
    audit: &AuditLog,
) -> SourceBatch {
    let mut all_rows: SourceBatch = Vec::new();

    for path in pending_files(inbox_dir) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match parse_file(&path, registry) {
            Ok(rows) => {
                audit.record(
                    EventKind::FileRead,
                    &file_name,
                    &format!("{} lignes a traiter", rows.len()),
                );
                all_rows.extend(rows);
            }
            Err(e) => {
                // 解析失败: 记录并归档,不重试
                audit.record(EventKind::FileReadError, &file_name, &e.to_string());
                warn!(file = %file_name, error = %e, "文件解析失败");
            }
        }

        // 成败一致归档
        if let Err(e) = archive_file(&path, archive_dir) {
            audit.record(EventKind::FileReadError, &file_name, &e.to_string());
            warn!(file = %file_name, error = %e, "文件归档失败");
        }
    }

    all_rows
}

/// 按扩展名分派解析
fn parse_file(path: &Path, registry: &SchemaRegistry) -> EtlResult<SourceBatch> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let (headers, rows) = match ext.as_str() {
        "csv" => parse_csv(path)?,
        "xlsx" | "xls" => parse_excel(path)?,
        _ => return Err(EtlError::UnsupportedFormat(ext)),
    };

    // 表头: 规范化 + 同义词映射
    let canonical_headers: Vec<String> = headers
        .iter()
        .map(|h| {
            let normalized = normalize_header(h);
            registry.canonical_column_name(&normalized).to_string()
        })
        .collect();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut records = Vec::new();
    for cells in rows {
        // 跳过完全空白的行
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let mut record = Record::new(Provenance::new(file_name.clone(), records.len() + 1));
        for (idx, cell) in cells.iter().enumerate() {
            if let Some(header) = canonical_headers.get(idx) {
                let trimmed = cell.trim();
                let value = if trimmed.is_empty() {
                    Value::Null
                } else {
                    Value::Text(trimmed.to_string())
                };
                record.set(header.clone(), value);
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// CSV 解析（表头 + 数据行）
fn parse_csv(path: &Path) -> EtlResult<(Vec<String>, Vec<Vec<String>>)> {
    if !path.exists() {
        return Err(EtlError::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }
    Ok((headers, rows))
}

/// Excel 解析（第一个工作表,首行为表头）
fn parse_excel(path: &Path) -> EtlResult<(Vec<String>, Vec<Vec<String>>)> {
    if !path.exists() {
        return Err(EtlError::FileNotFound(path.display().to_string()));
    }

    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e: calamine::XlsxError| EtlError::ExcelParseError(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.is_empty() {
        return Err(EtlError::ExcelParseError("Excel 文件无工作表".to_string()));
    }

    let sheet_name = sheet_names[0].clone();
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| EtlError::ExcelParseError(e.to_string()))?;

    let mut rows_iter = range.rows();
    let header_row = rows_iter
        .next()
        .ok_or_else(|| EtlError::ExcelParseError("Excel 文件无数据行".to_string()))?;

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    Ok((headers, rows))
}
