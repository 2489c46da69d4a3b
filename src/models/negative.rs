use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// 负数单据明细 (待红冲)
///
/// 金额/数量/税额按业务约定为负数，引擎内部统一取绝对值作为目标金额。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeItem {
    pub fid: i64,             // 单据主表ID
    pub fentryid: i64,        // 明细行ID
    pub fbillno: String,      // 单据编号
    pub fspbm: String,        // 商品编码/SKU
    pub fgoodsname: String,   // 商品名称
    pub ftaxrate: String,     // 税率 (作为匹配键使用，不做数值运算)
    pub famount: BigDecimal,  // 金额(负数)
    pub fnum: BigDecimal,     // 数量(负数)
    pub ftax: BigDecimal,     // 税额(负数)
    pub fsalertaxno: String,  // 销方税号
    pub fbuyertaxno: String,  // 购方税号
}

impl NegativeItem {
    /// 需要红冲的目标金额 (正数)
    pub fn target_amount(&self) -> BigDecimal {
        self.famount.abs()
    }
}
