//! Prompt templates for the two text-analysis requests of a cycle.

use vigil_types::{Behavior, KnowledgeCategory, PatientProfile};

/// Instruction for the conditioned captioning pass.
pub const DETAILED_CAPTION_INSTRUCTION: &str =
    "Describe the person in this image, their actions, clothing, and the surrounding environment:";

/// Patient context block embedded in both analysis prompts.
pub fn medical_context(profile: &PatientProfile) -> String {
    format!(
        "\nPatient Information:\n\
         - Diagnosis: {}\n\
         - Age: {}\n\
         - Gender: {}\n\
         - Key concerns: {}\n",
        profile.medical.diagnosis,
        profile.personal.age,
        profile.personal.gender,
        profile.monitoring.concerns.join(", "),
    )
}

/// Behaviour-analysis prompt; the reply contract is [`Behavior::FIELDS`].
pub fn analysis_prompt(profile: &PatientProfile, caption: &str) -> String {
    let hints = [
        "describe the current action",
        "describe the body posture",
        "describe the emotional state",
        "describe the current activity",
        "note any medically relevant observations",
    ];
    let contract: String = Behavior::FIELDS
        .iter()
        .zip(hints)
        .map(|(field, hint)| format!("{field}: [{hint}]\n"))
        .collect();
    format!(
        "You are analyzing a patient with the following medical context:\n{}\n\n\
         Analyze this image caption in the context of the patient's condition and respond in EXACTLY this format (no other text):\n\
         {contract}\nImage Caption: {caption}",
        medical_context(profile),
    )
}

/// Knowledge-extraction prompt; the reply contract is
/// [`KnowledgeCategory::extraction_fields`].
pub fn knowledge_prompt(profile: &PatientProfile, caption: &str) -> String {
    let contract: String = KnowledgeCategory::ALL
        .iter()
        .map(|category| {
            let hint = match category {
                KnowledgeCategory::Appearance => "physical appearance details",
                KnowledgeCategory::Behaviors => "observed behavior patterns",
                KnowledgeCategory::Environment => "surroundings and objects",
                KnowledgeCategory::MedicalIndicators => "any potential medical indicators observed",
            };
            format!("{}: [{hint}]\n", category.extraction_field())
        })
        .collect();
    format!(
        "You are analyzing a patient with the following medical context:\n{}\n\n\
         Extract information in EXACTLY this format (no other text):\n\
         {contract}\nFrom caption: {caption}",
        medical_context(profile),
    )
}
