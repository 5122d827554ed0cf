// src/services/status_machine.rs

use crate::{common::error::AppError, models::service_order::OsStatus};

/// Efeito colateral de uma transição, aplicado na mesma transação do status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Cliente e veículo precisam estar vinculados.
    RequireAssociations,
    /// Baixa no estoque a quantidade ainda não baixada de cada item.
    CommitStock,
    /// Grava valor_pecas / valor_mao_de_obra / valor_total_cliente.
    FreezeSnapshot,
    /// Lança o fechamento da OS no livro caixa.
    RecordClosureEntry,
    MarkDelivered,
    /// Estorna o lançamento de fechamento (reabertura).
    ReverseClosure,
    /// Limpa o snapshot e a data de entrega (reabertura).
    ClearSnapshot,
    /// Devolve ao estoque exatamente o que foi baixado.
    RestoreCommittedStock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: OsStatus,
    pub to: OsStatus,
    pub effects: Vec<TransitionEffect>,
}

impl TransitionPlan {
    pub fn has(&self, effect: TransitionEffect) -> bool {
        self.effects.contains(&effect)
    }

    /// Precisa carregar itens e mão de obra da OS.
    pub fn needs_lines(&self) -> bool {
        self.has(TransitionEffect::CommitStock) || self.has(TransitionEffect::FreezeSnapshot)
    }

    pub fn is_reopen(&self) -> bool {
        self.to == OsStatus::Aberta
            && matches!(self.from, OsStatus::Financeiro | OsStatus::Finalizada)
    }
}

/// Tabela de transições permitidas. Qualquer par fora daqui é rejeitado.
pub fn allowed_targets(from: OsStatus) -> &'static [OsStatus] {
    use OsStatus::*;
    match from {
        Agendamento => &[Orcamento, Aberta, Cancelada],
        Orcamento => &[Aberta, Cancelada],
        Aberta => &[EmAndamento, Financeiro, Cancelada],
        EmAndamento => &[Financeiro, Cancelada],
        Financeiro => &[Finalizada, Aberta],
        Finalizada => &[PagaCliente, Aberta],
        PagaCliente => &[],
        Cancelada => &[],
    }
}

pub fn can_transition(from: OsStatus, to: OsStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Monta o plano da transição `from -> to`.
///
/// `Ok(None)` quando a OS já está no status pedido: reenviar a mesma
/// requisição não reaplica baixa de estoque nem lançamentos.
pub fn plan_transition(from: OsStatus, to: OsStatus) -> Result<Option<TransitionPlan>, AppError> {
    if from == to {
        return Ok(None);
    }
    if !can_transition(from, to) {
        return Err(AppError::InvalidTransition { from, to });
    }

    use TransitionEffect::*;
    let effects = match (from, to) {
        (_, OsStatus::Financeiro) => vec![
            RequireAssociations,
            CommitStock,
            FreezeSnapshot,
            RecordClosureEntry,
        ],
        (_, OsStatus::Finalizada) => vec![MarkDelivered],
        (OsStatus::Financeiro | OsStatus::Finalizada, OsStatus::Aberta) => {
            vec![ReverseClosure, ClearSnapshot]
        }
        (_, OsStatus::Cancelada) => vec![RestoreCommittedStock],
        _ => Vec::new(),
    };

    Ok(Some(TransitionPlan { from, to, effects }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use OsStatus::*;

    const LISTED: &[(OsStatus, OsStatus)] = &[
        (Agendamento, Orcamento),
        (Agendamento, Aberta),
        (Agendamento, Cancelada),
        (Orcamento, Aberta),
        (Orcamento, Cancelada),
        (Aberta, EmAndamento),
        (Aberta, Financeiro),
        (Aberta, Cancelada),
        (EmAndamento, Financeiro),
        (EmAndamento, Cancelada),
        (Financeiro, Finalizada),
        (Financeiro, Aberta),
        (Finalizada, PagaCliente),
        (Finalizada, Aberta),
    ];

    #[test]
    fn every_unlisted_pair_is_rejected() {
        for from in OsStatus::ALL {
            for to in OsStatus::ALL {
                if from == to {
                    continue;
                }
                let listed = LISTED.contains(&(from, to));
                let result = plan_transition(from, to);
                if listed {
                    assert!(matches!(result, Ok(Some(_))), "{from} -> {to} deveria ser aceito");
                } else {
                    assert!(
                        matches!(result, Err(AppError::InvalidTransition { from: f, to: t }) if f == from && t == to),
                        "{from} -> {to} deveria ser rejeitado"
                    );
                }
            }
        }
    }

    #[test]
    fn same_status_is_a_no_op() {
        for status in OsStatus::ALL {
            assert!(matches!(plan_transition(status, status), Ok(None)));
        }
    }

    #[test]
    fn cancelled_is_terminal() {
        assert!(allowed_targets(Cancelada).is_empty());
        assert!(!can_transition(Cancelada, Aberta));
    }

    #[test]
    fn finalizing_commits_stock_and_freezes_totals() {
        let plan = plan_transition(EmAndamento, Financeiro).unwrap().unwrap();
        assert_eq!(
            plan.effects,
            vec![
                TransitionEffect::RequireAssociations,
                TransitionEffect::CommitStock,
                TransitionEffect::FreezeSnapshot,
                TransitionEffect::RecordClosureEntry,
            ]
        );
        assert!(plan.needs_lines());
    }

    #[test]
    fn reopen_reverses_closure_but_keeps_stock() {
        for from in [Financeiro, Finalizada] {
            let plan = plan_transition(from, Aberta).unwrap().unwrap();
            assert!(plan.is_reopen());
            assert!(plan.has(TransitionEffect::ReverseClosure));
            assert!(plan.has(TransitionEffect::ClearSnapshot));
            assert!(!plan.has(TransitionEffect::RestoreCommittedStock));
        }
        // Agendamento -> Aberta não é reabertura
        let plan = plan_transition(Agendamento, Aberta).unwrap().unwrap();
        assert!(!plan.is_reopen());
        assert!(plan.effects.is_empty());
    }

    #[test]
    fn cancelling_restores_committed_stock() {
        for from in [Agendamento, Orcamento, Aberta, EmAndamento] {
            let plan = plan_transition(from, Cancelada).unwrap().unwrap();
            assert_eq!(plan.effects, vec![TransitionEffect::RestoreCommittedStock]);
        }
    }
}
