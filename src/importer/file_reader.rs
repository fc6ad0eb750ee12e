// ==========================================
// 小额信贷平台 - 表格文件读取器
// ==========================================
// 依据: Import_Pipeline_Spec_v1.0.md - 4.1 文件读取
// 支持: Excel (.xlsx/.xls) / CSV (.csv/.txt)
// ==========================================

use crate::domain::types::FileType;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::path::Path;

// ==========================================
// 解析选项与结果
// ==========================================

/// 文件解析选项
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub has_headers: bool,
    pub delimiter: u8,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            has_headers: true,
            delimiter: b',',
        }
    }
}

/// 解析结果：列名 + 行矩阵
///
/// 行矩阵与源文件物理行序一致（跳过表头与全空行）。
/// 每行按列数补齐空串，保证按列索引映射时不越界。
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub encoding: String,
}

impl ParsedTable {
    /// 截断为预览样本（total_rows 保持真实总数）
    pub fn into_preview(mut self, sample_size: usize) -> ParsedTable {
        self.rows.truncate(sample_size);
        self
    }
}

// ==========================================
// CSV 读取器
// ==========================================
pub struct CsvTableReader;

impl CsvTableReader {
    pub fn read(&self, path: &Path, opts: &ParseOptions) -> ImportResult<ParsedTable> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        // 原始字节读入后做编码判定，再走 csv 解析
        let raw = std::fs::read(path)?;
        let (text, encoding) = decode_bytes(&raw);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(opts.delimiter)
            .flexible(true) // 允许行长度不一致
            .from_reader(text.as_bytes());

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row: Vec<String> = record.iter().map(|v| v.trim().to_string()).collect();

            // 跳过完全空白的行
            if row.iter().all(|v| v.is_empty()) {
                continue;
            }
            raw_rows.push(row);
        }

        Ok(build_table(raw_rows, opts.has_headers, encoding))
    }
}

// ==========================================
// Excel 读取器
// ==========================================
pub struct ExcelTableReader;

impl ExcelTableReader {
    pub fn read(&self, path: &Path, opts: &ParseOptions) -> ImportResult<ParsedTable> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let mut workbook = open_workbook_auto(path)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        // 仅读取第一个工作表
        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for data_row in range.rows() {
            // 逐单元格按类型转换（保留空单元格占位）
            let row: Vec<String> = data_row.iter().map(cell_to_string).collect();

            if row.iter().all(|v| v.is_empty()) {
                continue;
            }
            raw_rows.push(row);
        }

        Ok(build_table(raw_rows, opts.has_headers, "utf-8".to_string()))
    }
}

/// 按单元格类型转换为标准字符串
///
/// 数值类单元格不走字符串强转：整数值浮点去掉 ".0"，
/// 日期单元格输出 ISO 格式，布尔输出 true/false。
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Int(i) => format!("{}", i),
        Data::Bool(b) => format!("{}", b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => {
                if naive.time() == chrono::NaiveTime::MIN {
                    naive.date().format("%Y-%m-%d").to_string()
                } else {
                    naive.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            None => format!("{}", dt.as_f64()),
        },
        Data::DateTimeIso(s) => s.trim().to_string(),
        Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

// ==========================================
// 通用读取器（按声明类型分派）
// ==========================================
pub struct TabularFileReader;

impl TabularFileReader {
    /// 按声明的文件类型解析（类型不支持在任何 I/O 之前拒绝）
    pub fn read(
        &self,
        path: &Path,
        file_type: FileType,
        opts: &ParseOptions,
    ) -> ImportResult<ParsedTable> {
        match file_type {
            FileType::Csv => CsvTableReader.read(path, opts),
            FileType::Excel => ExcelTableReader.read(path, opts),
        }
    }

    /// 按扩展名推断类型后解析
    pub fn read_auto(&self, path: &Path, opts: &ParseOptions) -> ImportResult<ParsedTable> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let file_type = FileType::from_extension(&ext)
            .ok_or(ImportError::UnsupportedFormat(ext))?;
        self.read(path, file_type, opts)
    }
}

// ==========================================
// 内部工具
// ==========================================

/// 字节流编码判定
///
/// 判定顺序: UTF-8 BOM → UTF-8 校验 → Latin-1 兜底
/// （Latin-1 单字节一一对应 Unicode 前 256 码位，逐字节转换即可）
fn decode_bytes(raw: &[u8]) -> (String, String) {
    let body = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(raw);

    match std::str::from_utf8(body) {
        Ok(s) => (s.to_string(), "utf-8".to_string()),
        Err(_) => {
            let text: String = body.iter().map(|&b| b as char).collect();
            (text, "latin-1".to_string())
        }
    }
}

/// 从原始行矩阵构造 ParsedTable
///
/// has_headers 为真时首行作为列名；否则生成 Column1..N 合成列名。
fn build_table(mut raw_rows: Vec<Vec<String>>, has_headers: bool, encoding: String) -> ParsedTable {
    let columns: Vec<String> = if has_headers && !raw_rows.is_empty() {
        let header = raw_rows.remove(0);
        header
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                let trimmed = h.trim().to_string();
                if trimmed.is_empty() {
                    format!("Column{}", i + 1)
                } else {
                    trimmed
                }
            })
            .collect()
    } else {
        let width = raw_rows.iter().map(|r| r.len()).max().unwrap_or(0);
        (1..=width).map(|i| format!("Column{}", i)).collect()
    };

    // 行宽补齐到列数（短行补空串，长行保留超出部分不截断）
    for row in raw_rows.iter_mut() {
        while row.len() < columns.len() {
            row.push(String::new());
        }
    }

    let total_rows = raw_rows.len();
    ParsedTable {
        columns,
        rows: raw_rows,
        total_rows,
        encoding,
    }
}
