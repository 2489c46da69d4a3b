use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};

/// 金额尾差容差: ±0.01
pub fn amount_tolerance() -> BigDecimal {
    BigDecimal::new(BigInt::from(1), 2)
}

/// 税额尾差容差: ±0.06
pub fn tax_tolerance() -> BigDecimal {
    BigDecimal::new(BigInt::from(6), 2)
}

/// 数量清零阈值: 0.0001
pub fn quantity_epsilon() -> BigDecimal {
    BigDecimal::new(BigInt::from(1), 4)
}

/// 默认税率: 0.13 (仅在税率字段缺失时使用)
pub fn default_tax_rate() -> BigDecimal {
    BigDecimal::new(BigInt::from(13), 2)
}

/// 金额统一保留 2 位小数，四舍五入
pub fn round_amount(v: &BigDecimal) -> BigDecimal {
    v.with_scale_round(2, RoundingMode::HalfUp)
}

/// 匹配过程中数量保留 13 位小数
pub fn round_quantity(v: &BigDecimal) -> BigDecimal {
    v.with_scale_round(13, RoundingMode::HalfUp)
}

/// 导出时数量保留 10 位小数
pub fn round_quantity_export(v: &BigDecimal) -> BigDecimal {
    v.with_scale_round(10, RoundingMode::HalfUp)
}

/// 金额放大 10000 倍转为整数，消除十进制表示误差后做精确比较。
/// 精确匹配必须走整数比较，直接比较 Decimal 会漏掉合法的精确匹配。
pub fn scaled_int(v: &BigDecimal) -> i128 {
    let scaled = (v * BigDecimal::from(10_000)).with_scale_round(0, RoundingMode::HalfUp);
    scaled.to_i128().unwrap_or(i128::MAX)
}

/// 解析税率字符串。空串回退到默认税率 0.13，非空串必须可解析。
pub fn parse_tax_rate(raw: &str) -> Option<BigDecimal> {
    if raw.trim().is_empty() {
        return Some(default_tax_rate());
    }
    raw.trim().parse::<BigDecimal>().ok()
}

/// 税率字符串转 Decimal，解析失败时使用默认税率。
/// 入口处已做过 parse_tax_rate 校验，此处的回退只是兜底。
pub fn tax_rate_or_default(raw: &str) -> BigDecimal {
    parse_tax_rate(raw).unwrap_or_else(default_tax_rate)
}

/// 尾差校验
/// 规则:
/// - |单价 × 数量 - 金额| <= 0.01
/// - |金额 × 税率 - 税额| <= 0.06
pub fn validate_tail_diff(
    amount: &BigDecimal,
    quantity: &BigDecimal,
    unit_price: &BigDecimal,
    tax: &BigDecimal,
    tax_rate: &BigDecimal,
) -> Result<(), String> {
    // 金额校验
    let calc_amount = round_amount(&(quantity * unit_price));
    let amount_diff = (&calc_amount - amount).abs();
    if amount_diff > amount_tolerance() {
        return Err(format!("金额尾差超限: {} > {}", amount_diff, amount_tolerance()));
    }

    // 税额校验
    let calc_tax = round_amount(&(amount * tax_rate));
    let tax_diff = (&calc_tax - tax).abs();
    if tax_diff > tax_tolerance() {
        return Err(format!("税额尾差超限: {} > {}", tax_diff, tax_tolerance()));
    }

    Ok(())
}

/// 判断金额是否为正
pub fn is_positive(v: &BigDecimal) -> bool {
    *v > BigDecimal::zero()
}
