//! Prompt templates for the generation stages.
//!
//! Each builder takes exactly the inputs its stage declares. Prompts are
//! plain text; the generated answer is never parsed.

use ticketdesk_shared::TicketContext;

/// Problem-summary prompt: compare the complaint against retrieved history.
pub fn understanding(complaint: &str, history: &str) -> String {
    format!(
        "\
You are an assistant responsible for understanding the problem reported by a user and comparing it with past problems.
Create a summary of what the problem could be and whether it has been resolved before.
Go through the history and find out if similar problems occurred before.

USER COMPLAINT:
{complaint}

HISTORY:
{history}

Summarize and give a brief. Use only the relevant documents from the history.
If the same or a similar problem was found to be resolved, it can be ignored.
"
    )
}

/// Developer-note prompt: a Markdown handoff for engineers.
pub fn developer_note(complaint: &str, history: &str, summary: &str) -> String {
    format!(
        "\
You are responsible for taking all the details below about the problem a user is facing and handing it to a developer as Markdown for a Notion page.
Go through this carefully, find the relevant symptoms of the bug, and write Markdown for the developers.

USER PROBLEM:
{complaint}

RETRIEVED HISTORY:
{history}

PROBLEM SUMMARY:
{summary}

READ THROUGH THIS, UNDERSTAND THE PROBLEM, AND LIST THE PROBLEMS IN MARKDOWN FOR THE DEVELOPER.
GIVE A SIMPLE MARKDOWN NOTE ASKING THEM TO CHECK FOR POSSIBLE PROBLEMS.
"
    )
}

/// Client-reply prompt: one formal email, no internal details, no solutions.
///
/// `developer_note` must already have internal-only lines removed.
pub fn client_reply(
    complaint: &str,
    history: &str,
    summary: &str,
    developer_note: &str,
    ticket: &TicketContext,
) -> String {
    format!(
        "\
You are responsible for writing the final reply to the user who complained. Use a formal tone and politely describe the current situation based on the details below.
Assess the situation and write an email that would satisfy the user, describing the time it could take based on the complexity of the problem.

USER COMPLAINT:
{complaint}

PAST COMPLAINTS:
{history}

PROBLEM SUMMARY:
{summary}

NOTE TO DEVELOPER:
{developer_note}

DO NOT REVEAL ANY SECRETS OR ANYTHING RELATED TO THE CODEBASE FROM THE DEVELOPER NOTE.
WRITE EXACTLY ONE EMAIL, NOT MORE.
DO NOT PROVIDE A SOLUTION:
- If it is resolved, ask the client to please update to resolve it
- If it is not resolved, tell the client not to worry and that our developers will take care of it

COMPANY DETAILS:
{company}

DETAILS OF THE CLIENT WHO COMPLAINED:
{client}

DO NOT USE PLACEHOLDERS. DO NOT ADD ANY NOTES, ONLY WRITE THE REPLY EMAIL.
",
        company = ticket.company,
        client = ticket.client,
    )
}
