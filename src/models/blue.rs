use crate::money::{amount_tolerance, quantity_epsilon};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 蓝票明细行 (候选供给)
///
/// `current_remain_*` 是分区内维护的动态余额，构造时从原始可红冲值初始化，
/// 只减不增。蓝票实例不跨分区共享，分区拿到的是私有克隆。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueItem {
    pub fid: i64,                           // 发票主表ID
    pub fentryid: i64,                      // 明细行ID
    pub finvoiceno: String,                 // 发票号码
    pub fspbm: String,                      // 商品编码
    pub fgoodsname: String,                 // 商品名称
    pub ftaxrate: String,                   // 税率
    pub fitemremainredamount: BigDecimal,   // 原始剩余可红冲金额
    pub fitemremainrednum: BigDecimal,      // 原始剩余可红冲数量
    pub fredprice: BigDecimal,              // 可红冲单价 (可能为0)
    pub fissuetime: DateTime<Utc>,          // 开票时间
    // 内存中维护的动态余额，不参与序列化，入池前统一 reset_remaining
    #[serde(skip)]
    current_remain_amount: BigDecimal,
    #[serde(skip)]
    current_remain_num: BigDecimal,
}

impl BlueItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fid: i64,
        fentryid: i64,
        finvoiceno: impl Into<String>,
        fspbm: impl Into<String>,
        fgoodsname: impl Into<String>,
        ftaxrate: impl Into<String>,
        fitemremainredamount: BigDecimal,
        fitemremainrednum: BigDecimal,
        fredprice: BigDecimal,
        fissuetime: DateTime<Utc>,
    ) -> Self {
        let current_remain_amount = fitemremainredamount.clone();
        let current_remain_num = fitemremainrednum.clone();
        Self {
            fid,
            fentryid,
            finvoiceno: finvoiceno.into(),
            fspbm: fspbm.into(),
            fgoodsname: fgoodsname.into(),
            ftaxrate: ftaxrate.into(),
            fitemremainredamount,
            fitemremainrednum,
            fredprice,
            fissuetime,
            current_remain_amount,
            current_remain_num,
        }
    }

    /// 把动态余额重置为原始可红冲值。
    /// 反序列化得到的实例动态余额为零，必须先重置再入池。
    pub fn reset_remaining(&mut self) {
        self.current_remain_amount = self.fitemremainredamount.clone();
        self.current_remain_num = self.fitemremainrednum.clone();
    }

    pub fn current_remain_amount(&self) -> &BigDecimal {
        &self.current_remain_amount
    }

    pub fn current_remain_num(&self) -> &BigDecimal {
        &self.current_remain_num
    }

    /// 有效单价: 优先取可红冲单价，否则按动态余额折算 (余额/数量)，都不可用时为 0
    pub fn effective_price(&self) -> BigDecimal {
        if self.fredprice > BigDecimal::zero() {
            return self.fredprice.clone();
        }
        if self.current_remain_num > BigDecimal::zero() {
            return &self.current_remain_amount / &self.current_remain_num;
        }
        BigDecimal::zero()
    }

    /// 扣减余额。吃光策略: 扣减后余额绝对值小于容差则直接清零，
    /// 防止多次扣减后残留无法使用的碎屑金额。
    pub fn deduct(&mut self, amount: &BigDecimal, num: &BigDecimal) {
        self.current_remain_amount = &self.current_remain_amount - amount;
        self.current_remain_num = &self.current_remain_num - num;
        if self.current_remain_amount.abs() < amount_tolerance() {
            self.current_remain_amount = BigDecimal::zero();
        }
        if self.current_remain_num.abs() < quantity_epsilon() {
            self.current_remain_num = BigDecimal::zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn blue(amount: &str, num: &str, price: &str) -> BlueItem {
        BlueItem::new(
            1,
            1,
            "INV001",
            "SKU-A",
            "测试商品",
            "0.13",
            dec(amount),
            dec(num),
            dec(price),
            Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_effective_price_prefers_red_price() {
        let b = blue("100.00", "10", "10.00");
        assert_eq!(b.effective_price(), dec("10.00"));
    }

    #[test]
    fn test_effective_price_derived_from_balance() {
        let b = blue("100.00", "8", "0");
        assert_eq!(b.effective_price(), dec("12.5"));
    }

    #[test]
    fn test_effective_price_zero_when_no_quantity() {
        let b = blue("100.00", "0", "0");
        assert_eq!(b.effective_price(), dec("0"));
    }

    #[test]
    fn test_deduct_clamps_dust_to_zero() {
        let mut b = blue("100.00", "10", "10.00");
        b.deduct(&dec("99.995"), &dec("9.99999"));
        // 剩余 0.005 < 0.01 清零; 数量剩余 0.00001 < 0.0001 清零
        assert_eq!(b.current_remain_amount(), &dec("0"));
        assert_eq!(b.current_remain_num(), &dec("0"));
    }

    #[test]
    fn test_deduct_dust_clamp_idempotent() {
        // 连续扣减留下 <0.01 残余时，每次都精确归零
        let mut b = blue("100.00", "10", "10.00");
        b.deduct(&dec("50.00"), &dec("5"));
        assert_eq!(b.current_remain_amount(), &dec("50.00"));
        b.deduct(&dec("49.996"), &dec("5"));
        assert_eq!(b.current_remain_amount(), &dec("0"));
        b.deduct(&dec("0"), &dec("0"));
        assert_eq!(b.current_remain_amount(), &dec("0"));
    }
}
