use crate::models::NegativeItem;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 匹配结果 (单笔红冲记录)
///
/// `seq` 只在全局合并重排后才有意义，分区内的局部序号会被丢弃。
/// `tax_rate` 是本次匹配采用的税率，聚合再校验依赖它，必须始终携带。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub seq: u64,                              // 序号 (全局合并后分配)
    pub sku_code: String,                      // SKU编码
    pub blue_fid: i64,                         // 蓝票fid
    pub blue_entryid: i64,                     // 蓝票行号
    pub remain_amount_before: BigDecimal,      // 匹配前剩余可红冲金额
    pub unit_price: BigDecimal,                // 可红冲单价
    pub matched_amount: BigDecimal,            // 本次红冲金额(正数)
    pub negative_fid: i64,                     // 来源负数单据ID
    pub negative_entryid: i64,                 // 来源负数明细行ID
    pub blue_invoice_no: String,               // 发票号码
    pub goods_name: String,                    // 商品名称
    pub fissuetime: Option<DateTime<Utc>>,     // 蓝票开票日期 (聚合记录不携带)
    pub tax_rate: BigDecimal,                  // 本次匹配采用的税率
}

/// 匹配失败记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub negative: NegativeItem,
    pub reason: String,
}

/// 单次运行统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStats {
    pub total_negatives: usize,       // 处理的负数明细数
    pub matched_count: usize,         // 完全匹配成功数
    pub failed_count: usize,          // 失败数
    pub dropped_by_validation: usize, // 批量校验剔除的记录数
    pub total_matched_amount: BigDecimal,
    pub blue_lines_used: usize,       // 使用的蓝票行数 (去重)
    pub invoices_used: usize,         // 使用的发票数 (去重)
    pub skus_touched: usize,          // 涉及SKU数
}

/// SKU 统计汇总 (对应匹配统计 Sheet1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuSummary {
    pub sku_code: String,
    pub demand_amount: BigDecimal,     // 待红冲 SKU 总金额 (绝对值)
    pub demand_quantity: BigDecimal,   // 待红冲 SKU 总数量 (绝对值)
    pub matched_amount: BigDecimal,    // 红冲扣除蓝票的总金额
    pub matched_quantity: BigDecimal,  // 按 金额/单价 反算的总数量
    pub matched_line_count: usize,     // 红冲扣除蓝票的总行数
    pub matched_invoice_count: usize,  // 红冲扣除发票数 (去重)
    pub remaining_pool_amount: BigDecimal, // 对应候选池剩余可红冲金额
}

/// 整票红冲判断 (对应匹配统计 Sheet3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub blue_fid: i64,
    pub blue_invoice_no: String,
    pub fissuetime: Option<DateTime<Utc>>,
    pub matched_line_count: usize,      // 本次红冲扣除的蓝票行数
    pub matched_amount: BigDecimal,     // 本次红冲扣除总金额
    pub remaining_amount: BigDecimal,   // 扣除后剩余可红冲金额合计
}
