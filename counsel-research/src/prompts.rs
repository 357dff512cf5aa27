//! Stage prompt construction
//!
//! Each stage gets a prompt grounded in the research context and the
//! structured findings of the stages before it. All prompts demand JSON
//! with the common `{summary, evidence, gaps_identified}` shape plus
//! stage-specific sections.

use crate::types::Findings;
use counsel_core::ResearchContext;

fn personalization_block(ctx: &ResearchContext) -> String {
    if ctx.user_profile.is_empty() && ctx.priority_factors.is_empty() {
        return String::new();
    }
    format!(
        "\nUSER CONTEXT:\nProfile: {}\nPriorities: {}\nEmotional signals: {}\n",
        serde_json::to_string(&ctx.user_profile).unwrap_or_else(|_| "{}".to_string()),
        serde_json::to_string(&ctx.priority_factors).unwrap_or_else(|_| "{}".to_string()),
        serde_json::to_string(&ctx.emotional_indicators).unwrap_or_else(|_| "{}".to_string()),
    )
}

fn prior_findings_block(prior: &[&Findings]) -> String {
    if prior.is_empty() {
        return "No prior findings available.".to_string();
    }
    prior
        .iter()
        .enumerate()
        .map(|(i, f)| format!("Stage {}: {}", i + 1, f.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

const EVIDENCE_SCHEMA: &str = r#""evidence": [
    {
      "source_url": "where the information comes from",
      "source_name": "short source name",
      "reliability": 0.8,
      "extracted_text": "relevant information or data point",
      "relevance": 0.9
    }
  ]"#;

/// Stage 1: broad evidence-seeking exploration
pub fn stage_1(ctx: &ResearchContext) -> String {
    format!(
        r#"You are a professional research analyst conducting initial information gathering for:

QUERY: {query}
{context}
Provide a comprehensive initial analysis as JSON:

{{
  "summary": "brief overview of the topic and key considerations",
  "key_facts": ["important fact 1", "important fact 2"],
  {evidence},
  "gaps_identified": ["what specific information is still needed?"],
  "research_areas": ["area to explore further"]
}}

Focus on factual, evidence-based information with reliable sources. Be thorough but concise."#,
        query = ctx.user_query,
        context = personalization_block(ctx),
        evidence = EVIDENCE_SCHEMA,
    )
}

/// Stage 2: validation and fact-checking of stage 1 output
pub fn stage_2(ctx: &ResearchContext, previous: Option<&Findings>) -> String {
    let previous_json = previous
        .map(|f| serde_json::to_string_pretty(f).unwrap_or_default())
        .unwrap_or_else(|| "No prior findings available.".to_string());
    format!(
        r#"You are fact-checking previous research findings for this query:

QUERY: {query}

PREVIOUS FINDINGS TO VALIDATE:
{previous}

Validate these findings and respond as JSON:

{{
  "summary": "overview of validation results",
  "validated_facts": ["confirmed accurate fact"],
  "questionable_information": ["information that needs verification or conflicts"],
  {evidence},
  "gaps_identified": ["new gaps discovered during validation"],
  "reliability_assessment": {{"overall_confidence": 0.8}}
}}

Be critical and thorough; flag inconsistencies and unreliable sources explicitly."#,
        query = ctx.user_query,
        previous = previous_json,
        evidence = EVIDENCE_SCHEMA,
    )
}

/// Stage 3: targeted follow-up on accumulated gaps
pub fn stage_3(ctx: &ResearchContext, gaps: &[String]) -> String {
    let gap_list = if gaps.is_empty() {
        "- no open gaps recorded".to_string()
    } else {
        gaps.iter()
            .map(|g| format!("- {}", g))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        r#"You are conducting follow-up research to fill knowledge gaps for this query:

QUERY: {query}

KNOWLEDGE GAPS TO ADDRESS:
{gaps}

Provide targeted research as JSON:

{{
  "summary": "overview of follow-up findings",
  "gap_responses": [
    {{"gap": "the gap being addressed", "findings": "specific information found", "confidence": 0.8}}
  ],
  {evidence},
  "gaps_identified": ["gaps that still need research"]
}}

Give specific, actionable information for each gap."#,
        query = ctx.user_query,
        gaps = gap_list,
        evidence = EVIDENCE_SCHEMA,
    )
}

/// Stage 4: systematic comparison of the options
pub fn stage_4(ctx: &ResearchContext, prior: &[&Findings]) -> String {
    format!(
        r#"You are conducting comparative analysis for this decision query:

QUERY: {query}
{context}
RESEARCH SO FAR:
{prior}

Provide a systematic comparison as JSON:

{{
  "summary": "overview of options and comparison approach",
  "options_identified": [
    {{
      "option": "option name",
      "description": "brief description",
      "pros": ["advantage"],
      "cons": ["disadvantage"],
      "score": 0.8
    }}
  ],
  "comparison_criteria": ["criterion such as cost or ease of use"],
  "comparison_matrix": {{"Option 1": {{"criterion": 8}}}},
  {evidence},
  "gaps_identified": ["what would sharpen the comparison"]
}}

Provide objective, data-driven comparisons with numeric scores per criterion."#,
        query = ctx.user_query,
        context = personalization_block(ctx),
        prior = prior_findings_block(prior),
        evidence = EVIDENCE_SCHEMA,
    )
}

/// Stage 5: synthesis of everything gathered so far; no new lookups
pub fn stage_5(ctx: &ResearchContext, prior: &[&Findings]) -> String {
    format!(
        r#"You are synthesizing all research findings into coherent insights for:

QUERY: {query}

FINDINGS FROM PRIOR STAGES:
{prior}

Integrate the prior research — no new external lookups — and respond as JSON:

{{
  "summary": "executive summary of all research",
  "key_insights": ["major insight from the combined research"],
  "patterns_identified": ["pattern or relationship discovered"],
  "confidence_assessment": {{"overall_confidence": 0.85}},
  "evidence": [],
  "gaps_identified": ["area still under-supported"]
}}

Focus on a coherent, actionable synthesis."#,
        query = ctx.user_query,
        prior = prior_findings_block(prior),
    )
}

/// Stage 6: final conclusions and an actionable plan
pub fn stage_6(ctx: &ResearchContext, prior: &[&Findings]) -> String {
    format!(
        r#"You are providing final conclusions and recommendations for:

QUERY: {query}
{context}
FINDINGS FROM ALL PRIOR STAGES:
{prior}

Respond as JSON:

{{
  "summary": "final executive summary with a clear conclusion",
  "primary_recommendation": "top recommendation with reasoning",
  "recommendations": [
    {{"recommendation": "specific recommendation", "reasoning": "why", "priority": "high", "confidence": 0.9}}
  ],
  "implementation_plan": [
    {{"step": "step 1", "description": "what to do", "timeline": "when"}}
  ],
  "risk_assessment": [
    {{"risk": "potential risk", "likelihood": "medium", "impact": "low", "mitigation": "how to mitigate"}}
  ],
  "success_metrics": ["how to measure success"],
  "evidence": [],
  "gaps_identified": []
}}

Provide clear, actionable, personalized recommendations."#,
        query = ctx.user_query,
        context = personalization_block(ctx),
        prior = prior_findings_block(prior),
    )
}
