//! Projections from generator responses to UI contest records.

use swv_core::{ProjectionError, Response, Struct, Value};

use crate::schema::{generator, listed_contest};

/// `{"contestId": hex, "votingStake": int, "tracksLiveResults": bool}`
pub fn project_contest(contest: &Struct) -> Result<Value, ProjectionError> {
    Ok(Value::record([
        (
            listed_contest::CONTEST_ID,
            Value::hex(contest.data(listed_contest::CONTEST_ID)?),
        ),
        (
            listed_contest::VOTING_STAKE,
            Value::from_u64(contest.uint(listed_contest::VOTING_STAKE)?)?,
        ),
        (
            listed_contest::TRACKS_LIVE_RESULTS,
            Value::Bool(contest.bool(listed_contest::TRACKS_LIVE_RESULTS)?),
        ),
    ]))
}

/// `next` → `[contest]`
pub fn project_next(response: Response) -> Result<Vec<Value>, ProjectionError> {
    let contest = project_contest(response.record(generator::NEXT_CONTEST)?)?;
    Ok(vec![contest])
}

/// `nextCount` → `[[contest, ...]]`
pub fn project_next_count(response: Response) -> Result<Vec<Value>, ProjectionError> {
    let contests = response
        .records(generator::NEXT_CONTESTS)?
        .into_iter()
        .map(project_contest)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(contests = contests.len(), "contests received");
    Ok(vec![Value::List(contests)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use swv_core::{Datum, FieldError};

    fn listed(id: &'static [u8], stake: u64, live: bool) -> Struct {
        Struct::new()
            .with("contestId", bytes_of(id))
            .with("votingStake", stake)
            .with("tracksLiveResults", live)
    }

    fn bytes_of(id: &'static [u8]) -> Datum {
        Datum::Data(id.to_vec().into())
    }

    #[test]
    fn contest_record_shape() {
        let value = project_contest(&listed(&[0xde, 0xad, 0x00, 0x01], 1000, true)).unwrap();
        assert_eq!(
            value.to_json(),
            serde_json::json!({
                "contestId": "dead0001",
                "votingStake": 1000,
                "tracksLiveResults": true,
            })
        );
    }

    #[test]
    fn next_count_wraps_the_list() {
        let response = Struct::new().with(
            "nextContests",
            vec![listed(&[1], 1, false), listed(&[2], 2, true)],
        );
        let values = project_next_count(response).unwrap();
        assert_eq!(values.len(), 1);
        let contests = values[0].as_list().unwrap();
        assert_eq!(contests.len(), 2);
        assert_eq!(contests[1].get("contestId"), Some(&Value::from("02")));
    }

    #[test]
    fn oversized_stake_is_a_projection_error() {
        let response = Struct::new().with("nextContest", listed(&[9], u64::MAX, false));
        assert_eq!(
            project_next(response),
            Err(ProjectionError::IntegerOverflow { value: u64::MAX })
        );
    }

    #[test]
    fn missing_contest_is_a_projection_error() {
        assert_eq!(
            project_next(Struct::new()),
            Err(ProjectionError::Field(FieldError::Missing {
                field: "nextContest".into()
            }))
        );
    }
}
