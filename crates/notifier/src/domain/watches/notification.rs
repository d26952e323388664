use notifier_core::IdentifierKind;

use crate::domain::BalanceSnapshot;

/// Renders the balance change message for a snapshot, the template depends
/// on the identifier kind
pub fn render_message(snapshot: &BalanceSnapshot) -> String {
    let (title, label) = match snapshot.kind {
        IdentifierKind::Address => ("**Address Balance Changed**", "Address"),
        IdentifierKind::ExtendedKey => ("**Pubkey Balance Changed**", "Pubkey"),
    };
    let currency = snapshot.currency.code();

    format!(
        "{title}
Nickname: {nickname}
{label}: {identifier}
Previous Balance (satoshis): {previous_sat}
Previous Balance ({currency}): {previous_currency}
Transactions: {tx_count}
New Balance (satoshis): {balance_sat}
New Balance ({currency}): {balance_currency}
",
        nickname = snapshot.nickname,
        identifier = snapshot.identifier,
        previous_sat = snapshot.previous_balance_sat,
        previous_currency = snapshot.previous_balance_currency,
        tx_count = snapshot.tx_count,
        balance_sat = snapshot.balance_sat,
        balance_currency = snapshot.balance_currency,
    )
}
