//! Built-in assessment catalog, used when no TOML catalog is configured.

use crate::domain::{Catalog, CatalogError, PresentationMode, Question, QuestionKind, Section};

pub fn default_catalog() -> Result<Catalog, CatalogError> {
  use QuestionKind::*;

  let reading = Section::new("Reading Sentences", vec![
    Question::new(ReadAloud, "Please read this paragraph aloud: The rapid advancement of artificial intelligence is transforming industries worldwide, creating new opportunities while also presenting unique challenges."),
    Question::new(ReadAloud, "Please read aloud: The rhythmic sound of the waves crashing on the shore was calming."),
    Question::new(ReadAloud, "Please read aloud: His ability to solve complex problems quickly impressed everyone."),
    Question::new(ReadAloud, "Please read aloud: The museum displayed ancient artifacts from different civilizations."),
    Question::new(ReadAloud, "Please read aloud: Despite the heavy rain, they continued their journey without hesitation."),
  ])
  .with_instruction("Read each text aloud clearly and at a natural pace.");

  let speaking = Section::new("Speaking", vec![
    Question::new(FreeSpeech, "Describe a memorable trip you have taken.")
      .with_context("Speak for about a minute: where you went, who you were with, and why it stayed with you."),
    Question::new(FreeSpeech, "What are the advantages of reading books over watching movies?"),
    Question::new(FreeSpeech, "If you could invent something new, what would it be?"),
    Question::new(FreeSpeech, "How do you define success in life?"),
    Question::new(FreeSpeech, "Tell a short story about an unexpected discovery you made on a trip."),
  ]);

  let grammar = Section::new("Grammar", vec![
    Question::new(WordReorder, "Unscramble the following words to form a grammatically correct sentence: 'intelligence artificial the of challenges presents transformation'.")
      .with_options(["intelligence", "artificial", "the", "of", "challenges", "presents", "transformation"]),
    Question::new(ShortText, "Fill in the blank with the correct verb form: She ____ (go) to school every day.").with_expected("goes"),
    Question::new(ShortText, "Fill in the blank with the correct tense: They ____ (play) football when it started raining.").with_expected("were playing"),
    Question::new(ShortText, "Fill in the blank with the correct preposition: She is interested ____ learning new languages.").with_expected("in"),
    Question::new(ShortText, "Fill in the blank with the correct tense: By next summer, we ____ (move) to a new house.").with_expected("will have moved"),
  ]);

  let comprehension = Section::new("Reading Comprehension", vec![
    Question::new(NarrativeIntro, "Read the passage below, then answer the questions that follow.")
      .with_passage("Maya had walked past the old bookshop every morning for three years. One rainy Tuesday she finally stepped inside to wait out the storm, and found a map of her own street drawn a hundred years earlier."),
    Question::new(MultipleChoice, "Why did Maya enter the bookshop?")
      .with_options(["To buy a map", "To wait out the storm", "To meet a friend"])
      .with_expected("To wait out the storm"),
    Question::new(MultipleChoice, "How long had Maya walked past the shop?")
      .with_options(["Three weeks", "Three months", "Three years"])
      .with_expected("Three years"),
    Question::new(FillBlankSpeak, "Say the sentence with the missing word: She found a map of her own ____.")
      .with_expected("street"),
  ]);

  let repeat = Section::new("Repeat Exactly What You Hear", vec![
    Question::new(FreeSpeech, "The quick brown fox jumps over the lazy dog."),
    Question::new(FreeSpeech, "She sells seashells by the seashore."),
    Question::new(FreeSpeech, "How can I help you today?"),
    Question::new(FreeSpeech, "We will meet at the library tomorrow morning."),
    Question::new(FreeSpeech, "A journey of a thousand miles begins with a single step."),
  ])
  .with_mode(PresentationMode::ListenAndRepeat);

  Catalog::new(vec![reading, speaking, grammar, comprehension, repeat])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Position;

  #[test]
  fn built_in_catalog_is_valid() {
    let c = default_catalog().expect("valid");
    assert_eq!(c.sections().len(), 5);
    assert_eq!(c.total_questions(), 24);
  }

  #[test]
  fn repeat_section_is_listen_first() {
    let c = default_catalog().expect("valid");
    assert!(c.section(4).expect("repeat").questions.iter().all(|q| q.mode() == PresentationMode::ListenAndRepeat));
    assert_eq!(c.question(Position::new(3, 0)).map(|q| q.mode()), Some(PresentationMode::Passage));
  }
}
