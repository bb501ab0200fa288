//! Prompt construction for correction providers
//!
//! The instruction keeps the model on a short leash: fix spelling, word
//! boundaries and punctuation of Indonesian ASR output without adding,
//! removing or translating anything. Batches are numbered so the model
//! answers one line per input.

/// Build the system instruction, optionally pinning glossary terms
pub fn build_correction_prompt(glossary: Option<&[String]>) -> String {
    let glossary_text = match glossary {
        Some(terms) if !terms.is_empty() => format!(
            " Gunakan istilah berikut tanpa mengubah makna: {}.",
            terms.join(", ")
        ),
        _ => String::new(),
    };

    format!(
        "Anda adalah asisten yang melakukan koreksi transkripsi Bahasa Indonesia.\n\
         Tujuan: perbaiki salah eja/pemisah kata/tanda baca, jaga makna dan gaya bicara natural.\n\
         Jangan menambah/mengurangi informasi, jangan terjemahkan, jangan parafrase berlebihan.\n\
         Output hanya teks hasil koreksi satu baris per input.{}",
        glossary_text
    )
}

/// Wrap a batch as a numbered list so the model responds line per line
pub fn wrap_batch_prompt(instruction: &str, items: &[String]) -> String {
    let numbered = items
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}) {}", i + 1, t))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n{}\n\nBalas dengan format: satu baris per nomor yang dikoreksi, tanpa penjelasan.",
        instruction, numbered
    )
}
