//! Integration tests for the upvote toggle state machine.

use stackrate::storage::{NewRating, Storage, VoteTarget};
use stackrate::votes::{toggle, VoteError, VoteState};

fn test_storage() -> Storage {
    Storage::open_in_memory().unwrap()
}

struct Fixture {
    storage: Storage,
    author: i64,
    voter: i64,
    rating: i64,
    comment: i64,
}

fn fixture() -> Fixture {
    let storage = test_storage();
    let author = storage.create_user("author", false).unwrap();
    let voter = storage.create_user("voter", false).unwrap();
    let supp = storage.create_supplement("Zinc", "Minerals", None).unwrap();
    let rating = storage
        .create_rating(&NewRating {
            user_id: author,
            supplement_id: supp,
            score: 4,
            ..Default::default()
        })
        .unwrap();
    let comment = storage
        .create_comment(author, Some(rating), None, "my experience")
        .unwrap();
    Fixture {
        storage,
        author,
        voter,
        rating,
        comment,
    }
}

#[test]
fn test_toggle_pair_is_identity() {
    let f = fixture();
    let target = VoteTarget::Rating(f.rating);

    let first = toggle(&f.storage, f.voter, target).unwrap();
    assert_eq!(first.state, VoteState::Added);
    assert_eq!(first.count, 1);

    let second = toggle(&f.storage, f.voter, target).unwrap();
    assert_eq!(second.state, VoteState::Removed);
    assert_eq!(second.count, 0);
    assert!(!f.storage.has_upvote(f.voter, target).unwrap());
}

#[test]
fn test_odd_toggle_count_leaves_one_vote() {
    let f = fixture();
    let target = VoteTarget::Rating(f.rating);

    for _ in 0..5 {
        toggle(&f.storage, f.voter, target).unwrap();
    }
    assert!(f.storage.has_upvote(f.voter, target).unwrap());
    let rating = f.storage.get_rating(f.rating).unwrap().unwrap();
    assert_eq!(rating.upvote_count, 1);
}

#[test]
fn test_unregistered_voter_errors_and_count_holds() {
    let f = fixture();
    let target = VoteTarget::Rating(f.rating);

    for name in ["v1", "v2", "v3"] {
        let voter = f.storage.create_user(name, false).unwrap();
        toggle(&f.storage, voter, target).unwrap();
    }

    // An id that never corresponded to a user must not be read as a vote
    // removal; the accumulated count stays where it was.
    let err = toggle(&f.storage, 999_999, target).unwrap_err();
    assert!(matches!(err, VoteError::Storage(_)));

    let rating = f.storage.get_rating(f.rating).unwrap().unwrap();
    assert_eq!(rating.upvote_count, 3);
    assert_eq!(f.storage.recount_upvotes().unwrap(), 0);
}

#[test]
fn test_self_vote_rejected_without_mutation() {
    let f = fixture();
    let target = VoteTarget::Rating(f.rating);

    let err = toggle(&f.storage, f.author, target).unwrap_err();
    assert!(matches!(err, VoteError::SelfVote));

    let rating = f.storage.get_rating(f.rating).unwrap().unwrap();
    assert_eq!(rating.upvote_count, 0);
    assert!(!f.storage.has_upvote(f.author, target).unwrap());

    // Same rule for comments
    let err = toggle(&f.storage, f.author, VoteTarget::Comment(f.comment)).unwrap_err();
    assert!(matches!(err, VoteError::SelfVote));
}

#[test]
fn test_missing_target_is_not_found() {
    let f = fixture();
    let err = toggle(&f.storage, f.voter, VoteTarget::Rating(9999)).unwrap_err();
    assert!(matches!(err, VoteError::NotFound));
    let err = toggle(&f.storage, f.voter, VoteTarget::Comment(9999)).unwrap_err();
    assert!(matches!(err, VoteError::NotFound));
}

#[test]
fn test_counter_never_goes_negative_with_stale_row() {
    let f = fixture();
    let target = VoteTarget::Rating(f.rating);

    // Vote, then reset the counter out from under the voter row
    toggle(&f.storage, f.voter, target).unwrap();
    f.storage.set_upvote_count(target, 0).unwrap();

    let outcome = toggle(&f.storage, f.voter, target).unwrap();
    assert_eq!(outcome.state, VoteState::Removed);
    assert_eq!(outcome.count, 0);
}

#[test]
fn test_rating_and_comment_votes_are_independent() {
    let f = fixture();

    let on_rating = toggle(&f.storage, f.voter, VoteTarget::Rating(f.rating)).unwrap();
    let on_comment = toggle(&f.storage, f.voter, VoteTarget::Comment(f.comment)).unwrap();
    assert_eq!(on_rating.count, 1);
    assert_eq!(on_comment.count, 1);

    // Removing the comment vote leaves the rating vote in place
    let removed = toggle(&f.storage, f.voter, VoteTarget::Comment(f.comment)).unwrap();
    assert_eq!(removed.state, VoteState::Removed);
    assert!(f
        .storage
        .has_upvote(f.voter, VoteTarget::Rating(f.rating))
        .unwrap());
}

#[test]
fn test_votes_from_distinct_users_accumulate() {
    let f = fixture();
    let target = VoteTarget::Rating(f.rating);

    toggle(&f.storage, f.voter, target).unwrap();
    for name in ["v2", "v3"] {
        let voter = f.storage.create_user(name, false).unwrap();
        let outcome = toggle(&f.storage, voter, target).unwrap();
        assert_eq!(outcome.state, VoteState::Added);
    }
    let rating = f.storage.get_rating(f.rating).unwrap().unwrap();
    assert_eq!(rating.upvote_count, 3);

    // Counter agrees with a full recount
    assert_eq!(f.storage.recount_upvotes().unwrap(), 0);
}
