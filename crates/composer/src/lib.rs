//! Prompt composition — merges context fragments and topic history into
//! one structured prompt under a token budget.
//!
//! Selection when the budget is exceeded: the latest user instruction is
//! mandatory; fragments are ranked by specificity (diffs and explicit file
//! requests beat command output, listings, and free text); history is kept
//! most-recent-first. Ordering is deterministic so identical inputs always
//! yield byte-identical prompts — required for caching and reproducible
//! tests.

pub mod token;

use promptforge_core::error::ComposeError;
use promptforge_core::fragment::{ContextFragment, Provenance};
use promptforge_core::topic::Turn;
use serde::{Deserialize, Serialize};
use tracing::debug;

use token::{SECTION_OVERHEAD, estimate_tokens, estimate_turn_tokens};

/// A composed prompt, ready for the model gateway.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    /// The rendered prompt text
    pub text: String,

    /// Total estimated tokens
    pub total_tokens: usize,

    /// Provenance of the fragments that made it in, in rendered order
    pub included: Vec<Provenance>,

    /// Composition statistics
    pub stats: ComposeStats,
}

/// What was kept and what was dropped during composition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeStats {
    pub fragments_included: usize,
    pub fragments_dropped: usize,
    pub turns_included: usize,
    pub turns_dropped: usize,
    pub budget: usize,
}

/// The prompt composer. Stateless — create one and reuse it.
pub struct PromptComposer {
    budget: usize,
}

impl PromptComposer {
    /// Create a composer with the given token budget.
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    /// Compose a prompt from fragments, prior turns (most recent first),
    /// and the latest user instruction.
    ///
    /// Fails with `ComposeError::BudgetExceeded` only if the instruction
    /// alone cannot fit.
    pub fn compose(
        &self,
        instruction: &str,
        fragments: &[ContextFragment],
        history: &[Turn],
    ) -> Result<ComposedPrompt, ComposeError> {
        let instruction_tokens = estimate_tokens(instruction) + SECTION_OVERHEAD;
        if instruction_tokens > self.budget {
            return Err(ComposeError::BudgetExceeded {
                required: instruction_tokens,
                budget: self.budget,
            });
        }

        let mut remaining = self.budget - instruction_tokens;
        let mut stats = ComposeStats {
            budget: self.budget,
            ..ComposeStats::default()
        };

        // ── Fragments: most specific first, stable on input order ─────────
        let mut ranked: Vec<(usize, &ContextFragment)> = fragments.iter().enumerate().collect();
        ranked.sort_by_key(|(idx, f)| (f.kind.specificity(), *idx));

        let mut kept: Vec<(usize, &ContextFragment)> = Vec::new();
        for (idx, fragment) in ranked {
            let cost = fragment.token_estimate + SECTION_OVERHEAD;
            if cost <= remaining {
                remaining -= cost;
                kept.push((idx, fragment));
            } else {
                stats.fragments_dropped += 1;
            }
        }
        // Render in original input order regardless of selection order
        kept.sort_by_key(|(idx, _)| *idx);
        stats.fragments_included = kept.len();

        // ── History: keep most recent, render oldest first ────────────────
        let mut turns: Vec<&Turn> = Vec::new();
        for turn in history {
            let cost = estimate_turn_tokens(turn);
            if cost <= remaining {
                remaining -= cost;
                turns.push(turn);
            } else {
                stats.turns_dropped += 1;
            }
        }
        turns.reverse();
        stats.turns_included = turns.len();

        // ── Render ────────────────────────────────────────────────────────
        let mut text = String::new();

        if !kept.is_empty() {
            text.push_str("## Context\n");
            for (_, fragment) in &kept {
                text.push_str(&format!(
                    "\n### {}: {}\n{}\n",
                    fragment.kind, fragment.provenance.source, fragment.content
                ));
            }
            text.push('\n');
        }

        if !turns.is_empty() {
            text.push_str("## History\n");
            for turn in &turns {
                text.push_str(&format!(
                    "\n### User\n{}\n\n### Assistant\n{}\n",
                    turn.prompt, turn.response
                ));
            }
            text.push('\n');
        }

        text.push_str("## Instruction\n\n");
        text.push_str(instruction);

        let total_tokens = estimate_tokens(&text);
        debug!(
            total_tokens,
            budget = self.budget,
            fragments = stats.fragments_included,
            turns = stats.turns_included,
            "Composed prompt"
        );

        Ok(ComposedPrompt {
            text,
            total_tokens,
            included: kept.iter().map(|(_, f)| f.provenance.clone()).collect(),
            stats,
        })
    }
}
