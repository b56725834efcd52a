use super::*;
use crate::api::{PurchaseRef, SettleResponse};
use crate::realtime::{ClientEvent, ServerEvent};
use serde_json::json;

#[test]
fn test_outcome_win_amount_agreement() {
    assert!(GameRoundOutcome::loss().check().is_ok());
    assert!(GameRoundOutcome::win(500.0).check().is_ok());

    let mut bogus = GameRoundOutcome::win(0.0);
    assert_eq!(bogus.check(), Err(OutcomeError::WinWithoutAmount));

    bogus.is_win = false;
    bogus.win_amount = 3.0;
    assert_eq!(bogus.check(), Err(OutcomeError::LossWithAmount(3.0)));

    bogus.win_amount = -1.0;
    assert_eq!(bogus.check(), Err(OutcomeError::InvalidAmount(-1.0)));

    bogus.win_amount = f64::NAN;
    assert!(matches!(bogus.check(), Err(OutcomeError::InvalidAmount(_))));
}

#[test]
fn test_outcome_wire_format() {
    let outcome: GameRoundOutcome =
        serde_json::from_value(json!({"reels": [6, 6, 6], "isWin": true, "winAmount": 500}))
            .unwrap();
    assert!(outcome.is_win);
    assert_eq!(outcome.win_amount, 500.0);
    assert_eq!(outcome.result(), RoundResult::Reels(&[6, 6, 6]));
    let symbols: Vec<_> = [6u8, 6, 6].iter().map(|i| slot_symbol(*i)).collect();
    assert_eq!(symbols, vec!["7️⃣", "7️⃣", "7️⃣"]);

    let outcome: GameRoundOutcome =
        serde_json::from_value(json!({"roll": 73.4, "isWin": true, "winAmount": 19.8})).unwrap();
    assert_eq!(outcome.result(), RoundResult::Roll(73.4));

    let outcome: GameRoundOutcome =
        serde_json::from_value(json!({"isWin": false, "winAmount": 0})).unwrap();
    assert_eq!(outcome.result(), RoundResult::Empty);
}

#[test]
fn test_request_validation() {
    let request = GameRoundRequest::slots(1, 10.0, Currency::Gc);
    assert!(request.validate(&[Currency::Gc, Currency::Sc], 100.0).is_ok());
    assert_eq!(
        request.validate(&[Currency::Gc], 5.0),
        Err(RequestError::InsufficientFunds {
            currency: Currency::Gc,
            bet: 10.0,
            balance: 5.0,
        })
    );
    assert_eq!(
        request.validate(&[Currency::Sc], 100.0),
        Err(RequestError::IneligibleCurrency(Currency::Gc))
    );

    let zero = GameRoundRequest::slots(1, 0.0, Currency::Gc);
    assert_eq!(
        zero.validate(&[Currency::Gc], 100.0),
        Err(RequestError::InvalidBet(0.0))
    );

    let dice = GameRoundRequest::dice(2, 1.0, Currency::Sc, 120.0, DiceDirection::Over);
    assert_eq!(
        dice.validate(&[Currency::Sc], 10.0),
        Err(RequestError::InvalidTarget(120.0))
    );
}

#[test]
fn test_dice_direction() {
    assert!(DiceDirection::Over.wins(73.4, 50.0));
    assert!(!DiceDirection::Over.wins(22.1, 50.0));
    assert!(!DiceDirection::Over.wins(50.0, 50.0));
    assert!(DiceDirection::Under.wins(22.1, 50.0));
}

#[test]
fn test_request_wire_format() {
    let request = GameRoundRequest::dice(2, 1.5, Currency::Sc, 50.0, DiceDirection::Over);
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["betAmount"], json!(1.5));
    assert_eq!(value["currency"], json!("sc"));
    assert_eq!(value["params"]["kind"], json!("dice"));
    assert_eq!(value["params"]["type"], json!("over"));
}

#[test]
fn test_balance_merge_is_idempotent() {
    let mut balance = Balance {
        gc_balance: 100.0,
        sc_balance: 5.0,
    };
    let update = BalanceUpdate {
        gc_balance: Some(250.0),
        sc_balance: None,
    };
    balance.merge(&update);
    assert_eq!(balance.gc_balance, 250.0);
    assert_eq!(balance.sc_balance, 5.0);

    let snapshot = balance;
    balance.merge(&update);
    assert_eq!(balance, snapshot);
}

#[test]
fn test_realtime_envelopes() {
    let join = ClientEvent::JoinGameRoom {
        game_slug: "slots".to_string(),
        user: ChatUser {
            id: 7,
            username: "ada".to_string(),
            avatar_url: None,
        },
    };
    let value = serde_json::to_value(&join).unwrap();
    assert_eq!(value["event"], json!("join-game-room"));
    assert_eq!(value["data"]["gameSlug"], json!("slots"));

    let value = serde_json::to_value(ClientEvent::JoinUserRoom(7)).unwrap();
    assert_eq!(value, json!({"event": "join-user-room", "data": 7}));

    let event: ServerEvent = serde_json::from_value(json!({
        "event": "balance-update",
        "data": {"gc_balance": 10.0, "sc_balance": 2.5}
    }))
    .unwrap();
    assert_eq!(
        event,
        ServerEvent::BalanceUpdate(BalanceUpdate {
            gc_balance: Some(10.0),
            sc_balance: Some(2.5),
        })
    );

    let event: ServerEvent = serde_json::from_value(json!({
        "event": "moderation-action",
        "data": {"error": "Message rejected"}
    }))
    .unwrap();
    assert_eq!(event.name(), "moderation-action");
}

#[test]
fn test_ticket_bodies() {
    let value = serde_json::to_value(PurchaseRef { purchase_id: 42 }).unwrap();
    assert_eq!(value, json!({"purchaseId": 42}));

    let settle: SettleResponse =
        serde_json::from_value(json!({"success": true, "status": "claimed"})).unwrap();
    assert!(settle.status.is_terminal());
}
