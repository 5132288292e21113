//! Plantillas de los mensajes enviados al LLM.

use std::path::Path;

use crate::models::display_name;
use crate::synthesis::ChildSummary;

/// Caracteres de contenido de fichero incluidos en el mensaje.
const FILE_CONTENT_CHARS: usize = 10_000;
/// Caracteres de cada síntesis hija incluidos en el mensaje de directorio.
const CHILD_SYNTHESIS_CHARS: usize = 1_000;
/// Ideas clave incluidas en el mensaje final.
const MAX_FINAL_INSIGHTS: usize = 50;

pub const FILE_PREAMBLE: &str = r#"
Eres un analista de código experto.
Produces síntesis útiles centradas en el tema indicado por el usuario.
Respondes SIEMPRE con un único objeto JSON válido, sin explicaciones adicionales.
"#;

pub const FINAL_PREAMBLE: &str = r#"
Eres un analista experto que redacta un informe de síntesis completo de un repositorio.
Respondes SIEMPRE con un único objeto JSON válido, sin explicaciones adicionales.
"#;

pub fn file_prompt(path: &Path, content: &str, topic: &str) -> String {
    format!(
        r#"Analiza este fichero y sintetízalo con foco en el tema: "{topic}"

Fichero: {name}
Ruta: {path}

Contenido:
```
{content}
```

Devuelve un objeto JSON con estas claves:
{{
    "summary": "Descripción breve del propósito del fichero (1-2 frases)",
    "key_insights": ["Idea relacionada con el tema"],
    "novel_capabilities": ["Capacidades novedosas o interesantes"],
    "patterns": ["Patrones o enfoques destacables"],
    "relevance_to_topic": "Relación del fichero con '{topic}' (o 'Sin relación directa')"
}}

Céntrate en ideas con significado, no en detalles obvios."#,
        name = display_name(path),
        path = path.display(),
        content = truncate(content, FILE_CONTENT_CHARS),
    )
}

pub fn directory_prompt(path: &Path, children: &[ChildSummary], topic: &str) -> String {
    let children_text = children
        .iter()
        .map(|c| format!("### {}\n{}", c.name, truncate(&c.synthesis, CHILD_SYNTHESIS_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Sintetiza el contenido de este directorio a partir del análisis de sus elementos.
Tema: "{topic}"

Directorio: {name}
Ruta: {path}

Análisis de los elementos:
{children_text}

Devuelve un objeto JSON con estas claves:
{{
    "overview": "Propósito y arquitectura del directorio",
    "common_themes": ["Tema que aparece en varios componentes"],
    "key_insights": ["Cómo colaboran los componentes"],
    "novel_capabilities": ["Capacidades novedosas a este nivel"],
    "architectural_patterns": ["Decisiones de diseño visibles"],
    "integration_points": ["Cómo se conectan las partes"],
    "relevance_to_topic": "Relevancia global para '{topic}'"
}}

Sintetiza a un nivel superior; no repitas los detalles de cada fichero."#,
        name = display_name(path),
        path = path.display(),
    )
}

pub fn final_prompt(root_summary: &str, insights: &[String], topic: &str) -> String {
    let insights_text = insights
        .iter()
        .take(MAX_FINAL_INSIGHTS)
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Crea una síntesis completa de todo el repositorio centrada en: "{topic}"

Análisis del directorio raíz:
{root_summary}

Ideas clave de todos los niveles:
{insights_text}

Devuelve un objeto JSON con estas claves:
{{
    "executive_summary": "Resumen de 2-3 frases de los hallazgos sobre '{topic}'",
    "answer_to_topic": "Respuesta directa a '{topic}'",
    "novel_capabilities": [
        {{"capability": "Capacidad", "significance": "Por qué importa", "implementation": "Cómo se implementa"}}
    ],
    "architecture_insights": ["Patrón o decisión de arquitectura"],
    "design_philosophy": "Enfoque y principios de diseño",
    "unique_approaches": ["Enfoque innovador"],
    "potential_applications": ["Dónde aplicar estos patrones"],
    "key_takeaways": ["Aprendizaje más importante"]
}}

Prioriza hallazgos novedosos y no evidentes."#
    )
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_prompt_truncates_content() {
        let content = "x".repeat(FILE_CONTENT_CHARS + 500);
        let prompt = file_prompt(Path::new("/r/a.rs"), &content, "tema");
        assert!(prompt.contains("Fichero: a.rs"));
        assert!(!prompt.contains(&"x".repeat(FILE_CONTENT_CHARS + 1)));
    }

    #[test]
    fn directory_prompt_lists_children() {
        let children = vec![
            ChildSummary {
                name: "a.rs".into(),
                synthesis: "hace A".into(),
            },
            ChildSummary {
                name: "b.rs".into(),
                synthesis: "hace B".into(),
            },
        ];
        let prompt = directory_prompt(Path::new("/r/src"), &children, "tema");
        assert!(prompt.contains("### a.rs\nhace A"));
        assert!(prompt.contains("### b.rs\nhace B"));
    }

    #[test]
    fn final_prompt_caps_insights() {
        let insights: Vec<String> = (0..80).map(|i| format!("idea-{i}")).collect();
        let prompt = final_prompt("raíz", &insights, "tema");
        assert!(prompt.contains("- idea-49"));
        assert!(!prompt.contains("- idea-50"));
    }
}
