//! Weight updates from graded answers
//!
//! Each answer grade maps to a `(has, lacks)` likelihood pair. Items that
//! possess the asked attribute are multiplied by `has`, the rest by `lacks`.
//! The result is left unnormalized; the scorer normalizes on read.

use crate::catalog::CatalogView;
use crate::config::AnswerLikelihoods;
use crate::error::Result;
use crate::types::{Answer, ItemId, QuestionDescriptor};
use crate::weights::WeightVector;

/// Whether `id` possesses the attribute `question` asks about
pub fn possesses(view: &CatalogView, id: ItemId, question: &QuestionDescriptor) -> bool {
    match question {
        QuestionDescriptor::ExploreTag { tag_key, summary_tag_keys: None }
        | QuestionDescriptor::SoftConfirm { tag_key } => view.has_tag(id, tag_key),
        QuestionDescriptor::ExploreTag { summary_tag_keys: Some(members), .. } => {
            view.has_any_tag(id, members)
        }
        QuestionDescriptor::HardConfirm { kind, value } => view
            .item(id)
            .and_then(|item| item.confirm_value(*kind))
            .map(|field| field == *value)
            .unwrap_or(false),
    }
}

/// Apply one answered question to a weight vector, returning the new vector
pub fn apply_answer(
    weights: &WeightVector,
    view: &CatalogView,
    question: &QuestionDescriptor,
    answer: Answer,
    table: &AnswerLikelihoods,
) -> Result<WeightVector> {
    question.validate()?;
    let pair = table.pair(answer);

    Ok(weights
        .iter()
        .map(|(id, w)| (id, w * pair.factor(possesses(view, id, question))))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{item, tag};
    use crate::error::EngineError;
    use crate::types::{HardConfirmKind, SummaryTag};

    fn view() -> CatalogView {
        let mut items = vec![
            item(1, 0, &["red", "round"]),
            item(2, 0, &["blue"]),
            item(3, 0, &["green", "round"]),
        ];
        items[0].title = "apple".to_string();
        items[1].title = "Blueberry".to_string();
        items[2].title = "Avocado".to_string();
        CatalogView::new(
            items,
            vec![tag("red"), tag("blue"), tag("green"), tag("round")],
            vec![SummaryTag {
                key: "warm".to_string(),
                name: "Warm colours".to_string(),
                members: vec!["red".to_string(), "orange".to_string()],
            }],
        )
    }

    fn uniform() -> WeightVector {
        [(1, 1.0), (2, 1.0), (3, 1.0)].into_iter().collect()
    }

    #[test]
    fn test_yes_boosts_carriers() {
        let table = AnswerLikelihoods::default();
        let updated = apply_answer(&uniform(), &view(), &QuestionDescriptor::explore("round"), Answer::Yes, &table).unwrap();

        assert_eq!(updated.get(1), Some(table.yes.has));
        assert_eq!(updated.get(2), Some(table.yes.lacks));
        assert_eq!(updated.get(3), Some(table.yes.has));
    }

    #[test]
    fn test_unknown_is_identity() {
        let weights: WeightVector = [(1, 0.3), (2, 7.0), (3, 1e-9)].into_iter().collect();
        let updated = apply_answer(
            &weights,
            &view(),
            &QuestionDescriptor::explore("red"),
            Answer::Unknown,
            &AnswerLikelihoods::default(),
        )
        .unwrap();
        assert_eq!(updated, weights);
    }

    #[test]
    fn test_probably_is_milder_than_firm() {
        let table = AnswerLikelihoods::default();
        let q = QuestionDescriptor::explore("blue");
        let firm = apply_answer(&uniform(), &view(), &q, Answer::No, &table).unwrap();
        let soft = apply_answer(&uniform(), &view(), &q, Answer::ProbablyNo, &table).unwrap();

        let ratio = |w: &WeightVector| w.get(2).unwrap() / w.get(1).unwrap();
        assert!(ratio(&firm) < ratio(&soft));
        assert!(ratio(&soft) < 1.0);
    }

    #[test]
    fn test_summary_uses_logical_or() {
        let q = QuestionDescriptor::ExploreTag {
            tag_key: "warm".to_string(),
            summary_tag_keys: Some(vec!["red".to_string(), "orange".to_string()]),
        };
        let v = view();
        assert!(possesses(&v, 1, &q));
        assert!(!possesses(&v, 2, &q));
        assert!(!possesses(&v, 3, &q));
    }

    #[test]
    fn test_hard_confirm_matches_normalized_field() {
        let v = view();
        let q = QuestionDescriptor::HardConfirm {
            kind: HardConfirmKind::TitleInitial,
            value: "A".to_string(),
        };
        assert!(possesses(&v, 1, &q));
        assert!(!possesses(&v, 2, &q));
        assert!(possesses(&v, 3, &q));

        let by_author = QuestionDescriptor::HardConfirm {
            kind: HardConfirmKind::Author,
            value: "author 1".to_string(),
        };
        assert!(possesses(&v, 1, &by_author));
        assert!(!possesses(&v, 2, &by_author));
    }

    #[test]
    fn test_malformed_question_is_rejected() {
        let q = QuestionDescriptor::ExploreTag {
            tag_key: "warm".to_string(),
            summary_tag_keys: Some(vec![]),
        };
        let result = apply_answer(&uniform(), &view(), &q, Answer::Yes, &AnswerLikelihoods::default());
        assert!(matches!(result, Err(EngineError::UnknownQuestionKind(_))));
    }

    #[test]
    fn test_items_outside_view_lack_everything() {
        let weights: WeightVector = [(1, 1.0), (42, 1.0)].into_iter().collect();
        let table = AnswerLikelihoods::default();
        let updated = apply_answer(&weights, &view(), &QuestionDescriptor::explore("red"), Answer::Yes, &table).unwrap();
        assert_eq!(updated.get(42), Some(table.yes.lacks));
        assert_eq!(updated.len(), 2);
    }
}
