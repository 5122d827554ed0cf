pub mod finance;
pub mod inventory;
pub mod service_orders;

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::common::money::{is_money_amount, is_quantity};

// ---
// Validações customizadas compartilhadas pelos payloads
// ---
pub(crate) fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if *val <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.add_param("exclusive_min".into(), &0.0);
        err.message = Some("O valor deve ser maior que zero.".into());
        return Err(err);
    }
    Ok(())
}

/// Valor em reais: não negativo e no máximo 2 casas.
pub(crate) fn validate_money(val: &Decimal) -> Result<(), ValidationError> {
    validate_not_negative(val)?;
    if !is_money_amount(*val) {
        let mut err = ValidationError::new("scale");
        err.message = Some("O valor deve ter no máximo 2 casas decimais.".into());
        return Err(err);
    }
    Ok(())
}

/// Quantidade de item: maior que zero e no máximo 3 casas.
pub(crate) fn validate_quantity(val: &Decimal) -> Result<(), ValidationError> {
    validate_positive(val)?;
    if !is_quantity(*val) {
        let mut err = ValidationError::new("scale");
        err.message = Some("A quantidade deve ter no máximo 3 casas decimais.".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_validators() {
        assert!(validate_not_negative(&dec!(0)).is_ok());
        assert!(validate_not_negative(&dec!(-0.01)).is_err());
        assert!(validate_positive(&dec!(0.01)).is_ok());
        assert!(validate_positive(&dec!(0)).is_err());
    }

    #[test]
    fn scale_validators() {
        assert!(validate_money(&dec!(89.90)).is_ok());
        assert!(validate_money(&dec!(89.905)).is_err());
        assert!(validate_money(&dec!(-1)).is_err());
        assert!(validate_quantity(&dec!(1.5)).is_ok());
        assert!(validate_quantity(&dec!(0.0004)).is_err());
    }
}
