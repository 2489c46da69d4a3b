//! 结果导出
//!
//! 匹配结果的 CSV 输出，文件命名与输出目录集中管理。

use crate::models::MatchResult;
use crate::money::{is_positive, round_amount, round_quantity_export};
use bigdecimal::BigDecimal;
use chrono::Local;
use std::path::{Path, PathBuf};

/// 输出配置
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// 基础文件名 (不含扩展名)
    pub base_name: String,
    /// 是否在文件名中附加时间戳
    pub add_timestamp: bool,
    /// 输出目录，不存在时自动创建
    pub output_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_name: "match_results".to_string(),
            add_timestamp: true,
            output_dir: PathBuf::from("./output"),
        }
    }
}

/// 统一输出接口
pub struct ResultWriter {
    config: OutputConfig,
}

/// CSV 表头 (集中管理)
const HEADERS: [&str; 12] = [
    "序号",
    "待红冲 SKU 编码",
    "该 SKU 红冲对应蓝票的fid",
    "该 SKU 红冲对应蓝票的发票号码",
    "该 SKU 红冲对应蓝票的开票日期",
    "该 SKU 红冲对应蓝票的发票行号",
    "该 SKU红冲对应蓝票行的剩余可红冲金额",
    "该 SKU红冲对应蓝票行的可红冲单价",
    "本次红冲扣除的红冲金额（正数）",
    "本次红冲扣除 SKU数量",
    "扣除本次红冲后，对应蓝票行的剩余可红冲金额",
    "是否属于整行红冲",
];

impl ResultWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// 构建输出文件路径 (命名规则集中管理)
    pub fn build_filepath(&self) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let filename = if self.config.add_timestamp {
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            format!("{}_{}.csv", self.config.base_name, timestamp)
        } else {
            format!("{}.csv", self.config.base_name)
        };

        Ok(self.config.output_dir.join(filename))
    }

    /// 写入匹配结果，返回实际写入的文件路径
    pub fn write(&self, results: &[MatchResult]) -> Result<PathBuf, csv::Error> {
        let filepath = self.build_filepath()?;
        self.write_to(&filepath, results)?;
        tracing::info!("匹配结果已导出: {} ({} 条)", filepath.display(), results.len());
        Ok(filepath)
    }

    fn write_to(&self, filepath: &Path, results: &[MatchResult]) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(filepath)?;
        writer.write_record(HEADERS)?;
        for r in results {
            writer.write_record(result_to_row(r))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// 单条匹配记录转输出行
fn result_to_row(r: &MatchResult) -> Vec<String> {
    // 本次红冲扣除 SKU数量 (保留10位小数)
    let red_quantity = if is_positive(&r.unit_price) {
        round_quantity_export(&(&r.matched_amount / &r.unit_price))
    } else {
        BigDecimal::from(0)
    };

    let remaining_after = round_amount(&(&r.remain_amount_before - &r.matched_amount));

    // 剩余金额在 0 到 0.10 元之间视为整行红冲
    let is_full_line_red = if remaining_after >= BigDecimal::from(0)
        && remaining_after <= BigDecimal::new(bigdecimal::num_bigint::BigInt::from(10), 2)
    {
        "是"
    } else {
        "否"
    };

    let issue_date = r
        .fissuetime
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    vec![
        r.seq.to_string(),
        r.sku_code.clone(),
        r.blue_fid.to_string(),
        r.blue_invoice_no.clone(),
        issue_date,
        r.blue_entryid.to_string(),
        round_amount(&r.remain_amount_before).to_string(),
        r.unit_price.with_scale(10).to_string(),
        round_amount(&r.matched_amount).to_string(),
        red_quantity.with_scale(10).to_string(),
        remaining_after.to_string(),
        is_full_line_red.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{blue_item, negative_item, pool_of};
    use crate::strategy::{GreedyLargeStrategy, MatchingStrategy};

    fn sample_results() -> Vec<MatchResult> {
        let mut pool = pool_of(
            "SKU-A",
            "0.13",
            vec![
                blue_item(1, 1, "100.00", "10", "10.00"),
                blue_item(2, 1, "60.00", "6", "10.00"),
            ],
        );
        let mut results = Vec::new();
        let mut seq = 0u64;
        let mut s = GreedyLargeStrategy::new();
        let neg = negative_item(10, 1, "SKU-A", "0.13", "-130.00", "-13");
        s.match_single_negative(&neg, &mut pool, &mut results, &mut seq, false)
            .unwrap();
        results
    }

    #[test]
    fn test_write_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(OutputConfig {
            base_name: "match_results".to_string(),
            add_timestamp: false,
            output_dir: dir.path().to_path_buf(),
        });

        let results = sample_results();
        let path = writer.write(&results).unwrap();
        assert_eq!(path, dir.path().join("match_results.csv"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), results.len() + 1);
        assert!(lines[0].starts_with("序号"));
        // 第一条: 整行吃光 100.00, 剩余 0.00 -> 整行红冲
        assert!(lines[1].contains("100.00"));
        assert!(lines[1].contains("是"));
        // 第二条: 扣 30.00 剩 30.00 -> 非整行红冲
        assert!(lines[2].contains("30.00"));
        assert!(lines[2].contains("否"));
    }

    #[test]
    fn test_timestamped_filename() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(OutputConfig {
            base_name: "match_results".to_string(),
            add_timestamp: true,
            output_dir: dir.path().to_path_buf(),
        });

        let path = writer.build_filepath().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("match_results_"));
        assert!(name.ends_with(".csv"));
    }
}
