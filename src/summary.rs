use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::inquiry::LeadData;
use crate::language::Language;
use crate::llm::{ChatMessage, Role};

const NOT_GIVEN: &str = "not given";

// Body posted by the widget when it wants a sales-team summary of the chat
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub lead_data: Option<LeadData>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub summary: String,
}

pub fn summary_prompt(language: Language) -> &'static str {
    match language {
        Language::De => {
            "Erstelle eine kurze, strukturierte Zusammenfassung dieser Getriebe-Anfrage für das Verkaufsteam.\n\n\
Format:\n\
**Kunde:** [Name, Firma, Land]\n\
**Anwendung:** [Was soll angetrieben werden]\n\
**Technische Anforderungen:** [Drehmoment, Drehzahl, Übersetzung wenn genannt]\n\
**Produktempfehlung:** [Welches Getriebe wurde empfohlen]\n\
**Besonderheiten:** [Spezielle Wünsche oder Anforderungen]\n\
**Status:** [Offen/Offerte angefragt]\n\n\
Halte die Zusammenfassung unter 200 Wörter."
        }
        Language::En => {
            "Create a brief, structured summary of this gearbox inquiry for the sales team.\n\n\
Format:\n\
**Customer:** [Name, Company, Country]\n\
**Application:** [What needs to be driven]\n\
**Technical Requirements:** [Torque, Speed, Ratio if mentioned]\n\
**Product Recommendation:** [Which gearbox was recommended]\n\
**Special Notes:** [Special requests or requirements]\n\
**Status:** [Open/Quote requested]\n\n\
Keep the summary under 200 words."
        }
        Language::Fr => {
            "Créez un résumé bref et structuré de cette demande de réducteur pour l'équipe commerciale.\n\n\
Format:\n\
**Client:** [Nom, Entreprise, Pays]\n\
**Application:** [Ce qui doit être entraîné]\n\
**Exigences techniques:** [Couple, Vitesse, Rapport si mentionné]\n\
**Recommandation produit:** [Quel réducteur a été recommandé]\n\
**Notes spéciales:** [Demandes ou exigences particulières]\n\
**Statut:** [Ouvert/Devis demandé]\n\n\
Gardez le résumé sous 200 mots."
        }
        Language::It => {
            "Crea un breve riepilogo strutturato di questa richiesta di riduttore per il team vendite.\n\n\
Formato:\n\
**Cliente:** [Nome, Azienda, Paese]\n\
**Applicazione:** [Cosa deve essere azionato]\n\
**Requisiti tecnici:** [Coppia, Velocità, Rapporto se menzionato]\n\
**Raccomandazione prodotto:** [Quale riduttore è stato raccomandato]\n\
**Note speciali:** [Richieste o requisiti particolari]\n\
**Stato:** [Aperto/Preventivo richiesto]\n\n\
Mantieni il riepilogo sotto 200 parole."
        }
    }
}

// The transcript, prefixed with the contact form when there is one, as a
// single user turn for the summarizer
pub fn summary_context(messages: &[ChatMessage], lead: Option<&LeadData>) -> String {
    let transcript = messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "Customer",
                Role::Assistant => "Assistant",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let Some(lead) = lead else {
        return transcript;
    };

    let field = |v: &Option<String>| -> String {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NOT_GIVEN)
            .to_string()
    };
    let mut out = String::from("Contact form:\n");
    // writing to a String cannot fail
    let _ = writeln!(out, "- Name: {}", field(&lead.name));
    let _ = writeln!(out, "- Email: {}", field(&lead.email));
    let _ = writeln!(out, "- Phone: {}", field(&lead.phone));
    let _ = writeln!(out, "- Company: {}", field(&lead.company));
    let _ = writeln!(out, "- Country: {}", field(&lead.country));
    out.push_str("\nConversation:\n");
    out.push_str(&transcript);
    out
}

pub fn summary_turn(messages: &[ChatMessage], lead: Option<&LeadData>) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: summary_context(messages, lead),
    }
}
