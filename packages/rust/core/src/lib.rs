//! Triage pipeline for TicketDesk.
//!
//! A complaint enters as the seed of a [`record::ConversationRecord`]; five
//! stages then retrieve similar archived complaints, summarize the problem,
//! write a developer note, compose the client reply, and archive the
//! complaint. Collaborators sit behind the traits in [`collaborators`].

pub mod collaborators;
pub mod generation;
pub mod pipeline;
pub mod prompts;
pub mod record;
pub mod stages;

#[cfg(test)]
mod testing;
