//! Instruction template for summaries.

/// Fixed instructions sent ahead of every transcript.
const INSTRUCTIONS: &str = "\
You are an analyst preparing briefing notes from a market commentary video.
Read the transcript below and produce a markdown document with these sections:

## Key Points
A concise summary of the main points made in the video.

## Topics
A bulleted list of the topics discussed.

## Action Items
Concrete, actionable items a listener could follow up on.

## Sentiment
The overall sentiment of the speaker: optimistic, pessimistic, or neutral, with one sentence of justification.

## Further Research
Directions worth researching further based on the discussion.

Respond with the markdown document only.";

/// Wrap `transcript` in the summary instructions.
pub fn build_prompt(transcript: &str) -> String {
    format!("{INSTRUCTIONS}\n\n<transcript>\n{transcript}\n</transcript>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_requests_every_section() {
        let prompt = build_prompt("rates held steady");
        for heading in [
            "## Key Points",
            "## Topics",
            "## Action Items",
            "## Sentiment",
            "## Further Research",
        ] {
            assert!(prompt.contains(heading), "missing {heading}");
        }
        assert!(prompt.contains("optimistic, pessimistic, or neutral"));
        assert!(prompt.contains("markdown"));
    }

    #[test]
    fn transcript_is_enclosed_at_the_end() {
        let prompt = build_prompt("rates held steady");
        assert!(prompt.ends_with("<transcript>\nrates held steady\n</transcript>"));
    }
}
