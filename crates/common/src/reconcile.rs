//! The merge rule shared by the seller's and buyer's reconciliation loops:
//! identical on both sides, so it lives here rather than being duplicated.

use crate::model::Auction;

/// Folds a freshly fetched Platform copy of an auction into the local
/// mirror. `None` for `local` means "not seen before".
pub fn merge_auction(local: Option<Auction>, remote: Auction) -> Auction {
    match local {
        None => remote,
        Some(local) => {
            if remote.finished {
                remote
            } else if !remote.started {
                remote
            } else {
                // started && !finished: the seller (or, for a buyer, the
                // seller's announces) owns live state; keep the local copy.
                local
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuctionId, Cents, Item};

    fn base(id: u64) -> Auction {
        Auction::new(
            AuctionId(id),
            "lamp".into(),
            "alice".into(),
            Item { name: "Lamp".into(), description: "brass".into() },
            Cents(1000),
            1000,
            Cents(100),
        )
    }

    #[test]
    fn absent_locally_is_copied_in() {
        let remote = base(1);
        assert_eq!(merge_auction(None, remote.clone()), remote);
    }

    #[test]
    fn finished_remote_always_wins() {
        let mut local = base(1);
        local.current_price = Cents(5000);
        let mut remote = base(1);
        remote.finished = true;
        remote.current_price = Cents(1200);

        let merged = merge_auction(Some(local), remote.clone());
        assert_eq!(merged, remote);
    }

    #[test]
    fn unstarted_remote_overwrites_local() {
        let local = base(1);
        let mut remote = base(1);
        remote.name = "renamed lamp".into();

        let merged = merge_auction(Some(local), remote.clone());
        assert_eq!(merged.name, "renamed lamp");
    }

    #[test]
    fn started_and_unfinished_remote_is_ignored() {
        let mut local = base(1);
        local.started = true;
        local.current_price = Cents(1700);
        let mut remote = base(1);
        remote.started = true;
        remote.current_price = Cents(1000);

        let merged = merge_auction(Some(local.clone()), remote);
        assert_eq!(merged, local);
    }
}
