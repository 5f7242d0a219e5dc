use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, ready};

use super::{BoardDirectory, CardEntity, DirectoryError, DirectoryResult};

/// In-process directory for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryBoardDirectory {
    cards: Arc<DashMap<String, CardEntity>>,
    members: Arc<DashMap<String, HashSet<String>>>,
}

impl MemoryBoardDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a card.
    pub fn insert_card(&self, card: CardEntity) {
        self.cards.insert(card.id.clone(), card);
    }

    /// Grant `user_id` access to `board_id`.
    pub fn add_member(&self, board_id: &str, user_id: &str) {
        self.members
            .entry(board_id.to_owned())
            .or_default()
            .insert(user_id.to_owned());
    }

    /// Current state of a card, estimate included.
    pub fn card(&self, card_id: &str) -> Option<CardEntity> {
        self.cards.get(card_id).map(|card| card.clone())
    }
}

impl BoardDirectory for MemoryBoardDirectory {
    fn find_card(&self, card_id: &str) -> BoxFuture<'static, DirectoryResult<Option<CardEntity>>> {
        ready(Ok(self.card(card_id))).boxed()
    }

    fn set_story_points(
        &self,
        card_id: &str,
        story_points: u32,
    ) -> BoxFuture<'static, DirectoryResult<()>> {
        let result = match self.cards.get_mut(card_id) {
            Some(mut card) => {
                card.story_points = Some(i64::from(story_points));
                Ok(())
            }
            None => Err(DirectoryError::CardNotFound {
                card_id: card_id.to_owned(),
            }),
        };
        ready(result).boxed()
    }

    fn is_board_member(
        &self,
        board_id: &str,
        user_id: &str,
    ) -> BoxFuture<'static, DirectoryResult<bool>> {
        let member = self
            .members
            .get(board_id)
            .is_some_and(|members| members.contains(user_id));
        ready(Ok(member)).boxed()
    }
}
