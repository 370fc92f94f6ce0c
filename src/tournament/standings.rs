use crate::error::{CoreError, CoreResult};
use crate::model::TournamentParticipant;
use crate::store::CoreStorageTxn;
use crate::types::{Color, Outcome, TournamentId, UserId};

pub const POINTS_FOR_WIN: u32 = 2;
pub const POINTS_FOR_DRAW: u32 = 1;

fn apply(participant: &mut TournamentParticipant, score: Option<bool>) {
    participant.games_played += 1;
    match score {
        Some(true) => {
            participant.wins += 1;
            participant.points += POINTS_FOR_WIN;
        }
        Some(false) => participant.losses += 1,
        None => {
            participant.draws += 1;
            participant.points += POINTS_FOR_DRAW;
        }
    }
}

/// Credits a finished tournament game to both players' standings.
///
/// Takes the tournament row lock before touching participants so standings
/// writes serialize with searches on the same tournament.
pub(crate) async fn record_result(
    txn: &mut dyn CoreStorageTxn,
    tournament_id: TournamentId,
    white: UserId,
    black: UserId,
    outcome: Outcome,
) -> CoreResult<()> {
    let tournament = txn
        .load_tournament_by_id(tournament_id)
        .await?
        .ok_or(CoreError::NotFound("tournament"))?;
    txn.lock_tournament(tournament.reference)
        .await?
        .ok_or(CoreError::NotFound("tournament"))?;
    for (user_id, color) in [(white, Color::White), (black, Color::Black)] {
        let mut participant = txn
            .load_participant(tournament_id, user_id)
            .await?
            .ok_or(CoreError::NotAParticipant)?;
        let score = outcome.winner().map(|winner| winner == color);
        apply(&mut participant, score);
        txn.save_participant(&participant).await?;
    }
    Ok(())
}

/// Highest points first, then most wins, then earliest joiner.
pub(crate) fn rank(participants: &mut [TournamentParticipant]) {
    participants.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.wins.cmp(&a.wins))
            .then(a.joined_at.cmp(&b.joined_at))
            .then(a.user_id.cmp(&b.user_id))
    });
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    #[test]
    fn ranking_prefers_points_then_wins() {
        let now = Utc::now();
        let mut a = TournamentParticipant::new(1, 1, now);
        let mut b = TournamentParticipant::new(1, 2, now + Duration::seconds(1));
        let mut c = TournamentParticipant::new(1, 3, now + Duration::seconds(2));
        // a: two draws, b: one win one loss, c: one win
        apply(&mut a, None);
        apply(&mut a, None);
        apply(&mut b, Some(true));
        apply(&mut b, Some(false));
        apply(&mut c, Some(true));

        let mut table = vec![a, b, c];
        rank(&mut table);
        let order: Vec<UserId> = table.iter().map(|p| p.user_id).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(table[2].points, 2);
        assert_eq!(table[0].games_played, 2);
    }
}
