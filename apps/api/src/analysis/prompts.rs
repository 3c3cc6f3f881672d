// Interview analysis prompt templates.

/// Display name attached to every video submitted for ingestion.
pub const VIDEO_DISPLAY_NAME: &str = "Interview Video";

/// The fixed instruction sent alongside the ingested video.
/// Not parameterised by anything the user supplies.
pub const INTERVIEW_FEEDBACK_PROMPT: &str = "\
Your answer is shown to the user as-is on a web page. Separate sections with blank lines \
and put a short subheading in front of each section.
Analyze the given interview video and provide the following information, highlighting the key points:
1. Is the speech too long or too short?
2. How confident does the speaker appear?
3. What is the overall tone and clarity of the speech?
4. Extract information about the candidate such as skills, experience, education and certifications.
5. What is the overall emotion of the candidate?
6. Give a score out of 10 for the candidate.
7. Do not give recommendations.

Here is an example of a response:

This is a very short interview, barely lasting 50 seconds. It feels more like a candidate reading out \
their resume rather than engaging in a conversation.

Here's a breakdown:

Speech Length: Too short. It doesn't provide enough information to form a well-rounded impression.
Confidence: The speaker appears moderately confident. He speaks clearly, but there's a lack of passion \
or excitement in his voice. He seems a bit nervous.
Tone and Clarity: The tone is neutral and factual. The speech is clear and easy to understand, although \
there are a couple of instances of hesitation which suggest a lack of preparation or potential nervousness.
Skills and Experience:
Education: Appex University, Jaipur (no specific degree mentioned)
Certifications: VCA (no context provided)
Courses: Android Developer (no further detail)
Work Experience: XML work, apps, camera-based work (no specific job title mentioned)
Seeking: Android Developer Intern (May to August)
Overall Emotion: Neutral. There's a lack of positive or enthusiastic energy.
Score out of 10: 5/10. The candidate provides basic information but lacks depth and engagement.";
